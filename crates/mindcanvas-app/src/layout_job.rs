use crossbeam_channel::{Receiver, TryRecvError, bounded};
use mindcanvas_core::NodeId;
use mindcanvas_graph::{CancellationToken, ForceLayouter, LayoutInput, LayoutOutcome, Layouter};
use std::thread::JoinHandle;

/// A layout run on its own thread.
///
/// The worker only sees the snapshot it was started with. A cancelled job never
/// yields a result, even if the worker had already finished.
pub struct LayoutJob {
    token: CancellationToken,
    node_ids: Vec<NodeId>,
    result_rx: Receiver<LayoutOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl LayoutJob {
    pub fn spawn(input: LayoutInput) -> Self {
        Self::spawn_with(ForceLayouter, input, CancellationToken::new())
    }

    pub fn spawn_with<L>(layouter: L, input: LayoutInput, token: CancellationToken) -> Self
    where
        L: Layouter + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let node_ids = input.ids.clone();
        let worker_token = token.clone();

        let handle = std::thread::spawn(move || {
            if let Some(outcome) = layouter.execute(&input, &worker_token)
                && !worker_token.is_cancelled()
            {
                let _ = result_tx.send(outcome);
            }
        });

        Self {
            token,
            node_ids,
            result_rx,
            handle: Some(handle),
        }
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the worker has exited, with or without a result.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Non-blocking poll. `Ok(None)` means the worker is still running.
    pub fn try_result(&self) -> Result<Option<LayoutOutcome>, JobEnded> {
        if self.is_cancelled() {
            return Err(JobEnded);
        }
        match self.result_rx.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(JobEnded),
        }
    }

    /// Block until the worker finishes.
    pub fn wait(mut self) -> Option<LayoutOutcome> {
        let outcome = self.result_rx.recv().ok();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("Layout worker panicked");
        }
        outcome.filter(|_| !self.is_cancelled())
    }
}

/// The job ended without producing a result: it was cancelled or its worker died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEnded;
