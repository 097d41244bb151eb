use crossbeam_channel::Receiver;
use mindcanvas_core::{ImportError, NodeId, Vec2};
use mindcanvas_events::telemetry::{CanvasCommand, CommandSpan, GraphSize};
use mindcanvas_events::{CollaborationTransport, Event, EventBus, NotificationLevel, TransportError};
use mindcanvas_graph::{
    Canvas, CanvasGraph, CanvasOptions, InteractionController, KeyCommand, LayoutOutcome,
    PointerEvent, Response,
};
use mindcanvas_storage::{CanvasSummary, Storage, StorageError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

mod collab;
mod layout_job;
mod settings;

pub use collab::{CollabSession, MergeOutcome};
pub use layout_job::{JobEnded, LayoutJob};
pub use settings::AppSettings;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid canvas: {0}")]
    Import(#[from] ImportError),
    #[error("Collaboration error: {0}")]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No canvas storage is open")]
    NoStorage,
    #[error("Canvas {0} not found")]
    NotFound(String),
}

struct PendingLayout {
    job: LayoutJob,
    command: CommandSpan,
}

struct ControllerState {
    canvas: Canvas,
    interaction: InteractionController,
    storage: Option<Storage>,
    layout: Option<PendingLayout>,
    session: Option<CollabSession>,
}

/// Host-agnostic owner of one canvas.
///
/// Any shell (CLI, desktop, web bridge) drives the canvas through this controller
/// and listens on [`CanvasController::events`]. Clones share the same canvas, so a
/// clone can be handed to a worker or UI thread.
#[derive(Clone)]
pub struct CanvasController {
    state: Arc<Mutex<ControllerState>>,
    events: EventBus,
    settings: Arc<AppSettings>,
}

impl Default for CanvasController {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl CanvasController {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, AppSettings::default())
    }

    pub fn with_settings(name: impl Into<String>, settings: AppSettings) -> Self {
        let events = EventBus::new();
        let options = settings.canvas_options(CanvasOptions::default().viewport);
        let canvas = Canvas::with_options(name, options, events.clone());
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                canvas,
                interaction: InteractionController::new(),
                storage: None,
                layout: None,
                session: None,
            })),
            events,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn events(&self) -> Receiver<Event> {
        self.events.receiver()
    }

    // ------------------------------------------------------------------
    // Canvas access
    // ------------------------------------------------------------------

    pub fn with_canvas<R>(&self, read: impl FnOnce(&Canvas) -> R) -> R {
        read(&self.state.lock().canvas)
    }

    /// Run `apply` against the canvas. Any resulting commit is sent to collaborators.
    pub fn update<R>(&self, apply: impl FnOnce(&mut Canvas) -> R) -> R {
        let mut s = self.state.lock();
        let before = s.canvas.history().present_arc();
        let result = apply(&mut s.canvas);
        publish_if_changed(&mut s, &before);
        result
    }

    pub fn handle_pointer(&self, event: PointerEvent) -> Response {
        self.dispatch(|s| s.interaction.handle_pointer(&mut s.canvas, event))
    }

    pub fn handle_wheel(&self, screen: Vec2, delta: f32) -> Response {
        self.dispatch(|s| s.interaction.handle_wheel(&mut s.canvas, screen, delta))
    }

    pub fn handle_key(&self, command: KeyCommand) -> Response {
        self.dispatch(|s| s.interaction.handle_key(&mut s.canvas, command))
    }

    fn dispatch(&self, handle: impl FnOnce(&mut ControllerState) -> Response) -> Response {
        let mut s = self.state.lock();
        let before = s.canvas.history().present_arc();
        let response = handle(&mut *s);
        publish_if_changed(&mut s, &before);
        if let Response::LayoutRequested(ids) = &response {
            start_layout_locked(&mut s, ids);
        }
        response
    }

    // ------------------------------------------------------------------
    // Background layout
    // ------------------------------------------------------------------

    /// Start arranging `ids` on a worker thread. A running layout is cancelled first.
    /// Returns false when fewer than two of the ids exist.
    pub fn start_layout(&self, ids: &[NodeId]) -> bool {
        start_layout_locked(&mut self.state.lock(), ids)
    }

    pub fn is_layout_running(&self) -> bool {
        self.state.lock().layout.is_some()
    }

    /// Cancel the running layout. Nothing is committed.
    pub fn cancel_layout(&self) -> bool {
        let mut s = self.state.lock();
        cancel_layout_locked(&mut s)
    }

    /// Commit the running layout if it has finished.
    pub fn poll_layout(&self) -> Option<LayoutOutcome> {
        let mut s = self.state.lock();
        let pending = s.layout.as_ref()?;
        match pending.job.try_result() {
            Ok(None) => None,
            Ok(Some(outcome)) => {
                let pending = s.layout.take()?;
                commit_layout(&mut s, pending.command, &outcome);
                Some(outcome)
            }
            Err(JobEnded) => {
                let pending = s.layout.take()?;
                layout_failed(&s, pending);
                None
            }
        }
    }

    /// Block until the running layout finishes and commit it. The controller stays
    /// usable from other clones while this waits.
    pub fn wait_for_layout(&self) -> Option<LayoutOutcome> {
        let PendingLayout { job, command } = self.state.lock().layout.take()?;
        let Some(outcome) = job.wait() else {
            command.fail("layout produced no result");
            return None;
        };
        commit_layout(&mut self.state.lock(), command, &outcome);
        Some(outcome)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Open the database named by the settings, creating it if needed.
    pub fn open_storage(&self) -> Result<(), ControllerError> {
        let path = self
            .settings
            .resolved_storage_path()
            .ok_or(ControllerError::NoStorage)?;
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Opening canvas storage at {:?}", path);
        let storage = Storage::open(&path)?.with_quota(self.settings.storage_quota_bytes);
        self.attach_storage(storage);
        Ok(())
    }

    pub fn attach_storage(&self, storage: Storage) {
        self.state.lock().storage = Some(storage);
    }

    /// Save the current canvas under `id`. When the quota is exceeded a
    /// `StorageExhausted` event is published so the shell can offer an export.
    pub fn save(&self, id: &str) -> Result<CanvasSummary, ControllerError> {
        let s = self.state.lock();
        let storage = s.storage.as_ref().ok_or(ControllerError::NoStorage)?;
        let size = graph_size(s.canvas.graph());
        let command = CommandSpan::start(CanvasCommand::Save, size);
        command.note(id);
        let document = s.canvas.to_document();
        match storage.save_canvas(id, &document) {
            Ok(summary) => {
                command.succeed(size);
                self.events.publish(Event::CanvasSaved {
                    name: summary.name.clone(),
                });
                Ok(summary)
            }
            Err(err) => {
                command.fail(&err.to_string());
                if let StorageError::Exhausted {
                    required_bytes,
                    quota_bytes,
                } = err
                {
                    self.events.publish(Event::StorageExhausted {
                        required_bytes,
                        quota_bytes,
                    });
                    self.events.publish(Event::Notify {
                        level: NotificationLevel::Warning,
                        message: "Storage is full. Export the canvas to keep your changes."
                            .to_string(),
                    });
                }
                Err(err.into())
            }
        }
    }

    /// Replace the canvas with the one stored under `id`, as one undoable step.
    pub fn load(&self, id: &str) -> Result<(), ControllerError> {
        let mut s = self.state.lock();
        let storage = s.storage.as_ref().ok_or(ControllerError::NoStorage)?;
        let document = storage
            .load_canvas(id)?
            .ok_or_else(|| ControllerError::NotFound(id.to_string()))?;
        let before = s.canvas.history().present_arc();
        s.canvas.load_document(document)?;
        publish_if_changed(&mut s, &before);
        Ok(())
    }

    pub fn list_saved(&self) -> Result<Vec<CanvasSummary>, ControllerError> {
        let s = self.state.lock();
        let storage = s.storage.as_ref().ok_or(ControllerError::NoStorage)?;
        Ok(storage.list_canvases()?)
    }

    pub fn delete_saved(&self, id: &str) -> Result<bool, ControllerError> {
        let s = self.state.lock();
        let storage = s.storage.as_ref().ok_or(ControllerError::NoStorage)?;
        Ok(storage.delete_canvas(id)?)
    }

    pub fn export_file(&self, path: &Path) -> Result<(), ControllerError> {
        let document = self.with_canvas(|canvas| canvas.to_document());
        mindcanvas_storage::write_document(path, &document)?;
        tracing::info!("Exported canvas to {:?}", path);
        Ok(())
    }

    /// Import an exported document. A malformed file leaves the canvas untouched and
    /// publishes `ImportRejected`.
    pub fn import_file(&self, path: &Path) -> Result<(), ControllerError> {
        let before_size = self.with_canvas(|canvas| graph_size(canvas.graph()));
        let command = CommandSpan::start(CanvasCommand::Import, before_size);
        command.note(&path.display().to_string());

        let document = match mindcanvas_storage::read_document(path) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!("Rejected import of {:?}: {}", path, err);
                command.fail(&err.to_string());
                self.events.publish(Event::ImportRejected {
                    reason: err.to_string(),
                });
                return Err(err.into());
            }
        };

        let mut s = self.state.lock();
        let before = s.canvas.history().present_arc();
        if let Err(err) = s.canvas.load_document(document) {
            command.fail(&err.to_string());
            return Err(err.into());
        }
        publish_if_changed(&mut s, &before);
        command.succeed(graph_size(s.canvas.graph()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Collaboration
    // ------------------------------------------------------------------

    /// Share the current canvas and return the id others join with.
    pub fn share(
        &self,
        transport: Arc<dyn CollaborationTransport>,
    ) -> Result<String, ControllerError> {
        let mut s = self.state.lock();
        leave_locked(&mut s);
        let data = s.canvas.canvas_data();
        let name = s.canvas.name().to_string();
        let (session, _) =
            CollabSession::create(transport, &name, &self.settings.user_name, data)?;
        let canvas_id = session.canvas_id().to_string();
        s.session = Some(session);
        Ok(canvas_id)
    }

    /// Join a shared canvas, replacing the local graph with the shared one.
    pub fn join(
        &self,
        transport: Arc<dyn CollaborationTransport>,
        canvas_id: &str,
    ) -> Result<(), ControllerError> {
        let mut s = self.state.lock();
        leave_locked(&mut s);
        let (session, response) =
            CollabSession::join(transport, canvas_id, &self.settings.user_name)?;
        if let Err(err) = s.canvas.apply_canvas_data(response.data) {
            tracing::warn!("Shared canvas {} is invalid: {}", canvas_id, err);
            if let Err(leave_err) = session.leave() {
                tracing::warn!("Failed to leave {}: {}", canvas_id, leave_err);
            }
            return Err(err.into());
        }
        s.canvas.set_name(response.name);
        s.session = Some(session);
        Ok(())
    }

    pub fn leave(&self) -> bool {
        leave_locked(&mut self.state.lock())
    }

    pub fn is_shared(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Apply queued remote events. Remote snapshots are never echoed back.
    pub fn pump_remote(&self) -> Vec<MergeOutcome> {
        let mut s = self.state.lock();
        let ControllerState {
            canvas, session, ..
        } = &mut *s;
        match session {
            Some(session) => session.pump(canvas),
            None => Vec::new(),
        }
    }

    pub fn update_presence(&self, cursor: Option<Vec2>) -> Result<(), ControllerError> {
        let s = self.state.lock();
        if let Some(session) = &s.session {
            session.update_presence(cursor, s.canvas.selected_ids())?;
        }
        Ok(())
    }
}

pub(crate) fn graph_size(graph: &CanvasGraph) -> GraphSize {
    GraphSize {
        nodes: graph.node_count(),
        connections: graph.connection_count(),
        groups: graph.group_count(),
    }
}

fn publish_if_changed(s: &mut ControllerState, before: &Arc<CanvasGraph>) {
    let Some(session) = &s.session else {
        return;
    };
    if Arc::ptr_eq(before, &s.canvas.history().present_arc()) {
        return;
    }
    if let Err(err) = session.publish(s.canvas.canvas_data()) {
        tracing::warn!("Failed to publish canvas update: {}", err);
    }
}

fn start_layout_locked(s: &mut ControllerState, ids: &[NodeId]) -> bool {
    cancel_layout_locked(s);
    let input = s.canvas.layout_input(ids);
    if input.len() < 2 {
        tracing::debug!("Skipping layout of {} node(s)", input.len());
        return false;
    }

    let command = CommandSpan::start(CanvasCommand::AutoLayout, graph_size(s.canvas.graph()));
    command.note(&format!("arranging {} nodes", input.len()));
    s.canvas.events().publish(Event::LayoutStarted {
        node_count: input.len(),
    });
    s.layout = Some(PendingLayout {
        job: LayoutJob::spawn(input),
        command,
    });
    true
}

fn cancel_layout_locked(s: &mut ControllerState) -> bool {
    let Some(pending) = s.layout.take() else {
        return false;
    };
    pending.job.cancel();
    pending.command.fail("cancelled");
    s.canvas.events().publish(Event::LayoutCancelled);
    true
}

fn commit_layout(s: &mut ControllerState, command: CommandSpan, outcome: &LayoutOutcome) {
    let before = s.canvas.history().present_arc();
    s.canvas.apply_layout(outcome);
    publish_if_changed(s, &before);
    command.note(&format!(
        "{} iterations, converged: {}, separation passes: {}",
        outcome.iterations, outcome.converged, outcome.separation_passes
    ));
    command.succeed(graph_size(s.canvas.graph()));
}

fn layout_failed(s: &ControllerState, pending: PendingLayout) {
    tracing::error!("Layout worker ended without a result");
    pending.command.fail("worker ended without a result");
    s.canvas.events().publish(Event::Notify {
        level: NotificationLevel::Error,
        message: "Auto layout failed".to_string(),
    });
}

fn leave_locked(s: &mut ControllerState) -> bool {
    let Some(session) = s.session.take() else {
        return false;
    };
    if let Err(err) = session.leave() {
        tracing::warn!("Failed to leave shared canvas: {}", err);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindcanvas_events::InMemoryTransport;

    fn stacked(controller: &CanvasController, count: usize) -> Vec<NodeId> {
        controller.update(|canvas| {
            (0..count)
                .map(|i| canvas.add_node(Vec2::new(i as f32 * 10.0, 0.0)))
                .collect()
        })
    }

    fn no_overlaps(controller: &CanvasController) -> bool {
        controller.with_canvas(|canvas| {
            let rects: Vec<_> = canvas.graph().nodes().map(|n| n.rect()).collect();
            rects.iter().enumerate().all(|(i, a)| {
                rects[i + 1..].iter().all(|b| !a.overlaps(b))
            })
        })
    }

    #[test]
    fn test_background_layout_commits_once() {
        let controller = CanvasController::new("layout");
        let ids = stacked(&controller, 4);
        let depth = controller.with_canvas(|c| c.history().undo_depth());
        let events = controller.events();

        assert!(controller.start_layout(&ids));
        assert!(controller.is_layout_running());
        let outcome = controller.wait_for_layout().expect("layout finishes");

        assert_eq!(outcome.positions.len(), 4);
        assert!(!controller.is_layout_running());
        assert_eq!(controller.with_canvas(|c| c.history().undo_depth()), depth + 1);
        assert!(no_overlaps(&controller));

        let received: Vec<Event> = events.try_iter().collect();
        assert!(received.contains(&Event::LayoutStarted { node_count: 4 }));
        assert!(
            received
                .iter()
                .any(|e| matches!(e, Event::LayoutCompleted { node_count: 4, .. }))
        );
    }

    #[test]
    fn test_cancelled_layout_commits_nothing() {
        let controller = CanvasController::new("layout");
        let ids = stacked(&controller, 3);
        let before = controller.with_canvas(|c| c.graph().clone());
        let events = controller.events();

        assert!(controller.start_layout(&ids));
        assert!(controller.cancel_layout());

        assert!(controller.poll_layout().is_none());
        assert!(controller.wait_for_layout().is_none());
        assert_eq!(controller.with_canvas(|c| c.graph().clone()), before);
        assert!(events.try_iter().any(|e| e == Event::LayoutCancelled));
        assert!(!controller.cancel_layout());
    }

    #[test]
    fn test_layout_needs_two_nodes() {
        let controller = CanvasController::new("layout");
        let ids = stacked(&controller, 1);
        assert!(!controller.start_layout(&ids));
        assert!(!controller.is_layout_running());
    }

    #[test]
    fn test_auto_layout_key_starts_background_job() {
        let controller = CanvasController::new("keys");
        let ids = stacked(&controller, 2);
        controller.update(|canvas| canvas.set_selection(&ids));

        let response = controller.handle_key(KeyCommand::AutoLayout);

        assert!(matches!(response, Response::LayoutRequested(_)));
        assert!(controller.is_layout_running());
        assert!(controller.wait_for_layout().is_some());
        assert!(no_overlaps(&controller));
    }

    #[test]
    fn test_clone_polls_from_another_thread() {
        let controller = CanvasController::new("threads");
        let ids = stacked(&controller, 3);
        controller.start_layout(&ids);

        let worker = controller.clone();
        let outcome = std::thread::spawn(move || {
            loop {
                if let Some(outcome) = worker.poll_layout() {
                    return Some(outcome);
                }
                if !worker.is_layout_running() {
                    return None;
                }
                std::thread::yield_now();
            }
        })
        .join()
        .unwrap();

        assert!(outcome.is_some());
        assert!(no_overlaps(&controller));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let controller = CanvasController::new("Board");
        controller.attach_storage(Storage::new_in_memory().unwrap());
        stacked(&controller, 2);
        let saved = controller.with_canvas(|c| c.to_document());

        let summary = controller.save("board-1").unwrap();
        assert_eq!(summary.node_count, 2);
        assert_eq!(controller.list_saved().unwrap().len(), 1);

        controller.update(|canvas| {
            let ids: Vec<NodeId> = canvas.graph().node_ids().collect();
            canvas.delete_nodes(&ids);
        });
        controller.load("board-1").unwrap();

        assert_eq!(controller.with_canvas(|c| c.to_document()), saved);
        assert!(matches!(
            controller.load("missing"),
            Err(ControllerError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_over_quota_reports_exhaustion() {
        let controller = CanvasController::new("Board");
        controller.attach_storage(Storage::new_in_memory().unwrap().with_quota(Some(64)));
        stacked(&controller, 3);
        let events = controller.events();

        let err = controller.save("board").unwrap_err();

        assert!(matches!(
            err,
            ControllerError::Storage(StorageError::Exhausted { quota_bytes: 64, .. })
        ));
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, Event::StorageExhausted { quota_bytes: 64, .. }))
        );
        assert!(controller.list_saved().unwrap().is_empty());
    }

    #[test]
    fn test_save_without_storage_fails() {
        let controller = CanvasController::new("Board");
        assert!(matches!(controller.save("x"), Err(ControllerError::NoStorage)));
    }

    #[test]
    fn test_export_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        let source = CanvasController::new("Exported");
        stacked(&source, 2);
        source.export_file(&path).unwrap();

        let target = CanvasController::new("Other");
        target.import_file(&path).unwrap();

        assert_eq!(
            target.with_canvas(|c| c.to_document()),
            source.with_canvas(|c| c.to_document())
        );
        assert_eq!(target.with_canvas(|c| c.history().undo_depth()), 1);
    }

    #[test]
    fn test_malformed_import_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"nodes\": [ {").unwrap();
        let controller = CanvasController::new("Board");
        stacked(&controller, 1);
        let before = controller.with_canvas(|c| c.to_document());
        let events = controller.events();

        assert!(controller.import_file(&path).is_err());

        assert_eq!(controller.with_canvas(|c| c.to_document()), before);
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, Event::ImportRejected { .. }))
        );
    }

    #[test]
    fn test_shared_canvas_converges() {
        let transport: Arc<dyn CollaborationTransport> = Arc::new(InMemoryTransport::new());
        let host = CanvasController::new("Shared");
        stacked(&host, 1);
        let canvas_id = host.share(transport.clone()).unwrap();

        let guest = CanvasController::new("Mine");
        guest.join(transport.clone(), &canvas_id).unwrap();
        assert_eq!(guest.with_canvas(|c| c.graph().node_count()), 1);
        assert_eq!(guest.with_canvas(|c| c.name().to_string()), "Shared");

        host.update(|canvas| canvas.add_node(Vec2::new(400.0, 0.0)));
        let outcomes = guest.pump_remote();

        assert!(outcomes.contains(&MergeOutcome::Applied));
        assert_eq!(
            guest.with_canvas(|c| c.canvas_data()),
            host.with_canvas(|c| c.canvas_data())
        );
        assert!(
            host.pump_remote()
                .iter()
                .all(|o| *o != MergeOutcome::Applied)
        );

        let third = CanvasController::new("Late");
        assert!(matches!(
            third.join(transport, &canvas_id),
            Err(ControllerError::Transport(TransportError::RoomFull { .. }))
        ));
    }

    #[test]
    fn test_guest_leaving_notifies_host() {
        let transport: Arc<dyn CollaborationTransport> = Arc::new(InMemoryTransport::new());
        let host = CanvasController::new("Shared");
        let canvas_id = host.share(transport.clone()).unwrap();
        let guest = CanvasController::new("Guest");
        guest.join(transport, &canvas_id).unwrap();
        let events = host.events();

        assert!(guest.leave());
        assert!(!guest.is_shared());
        host.pump_remote();

        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, Event::ParticipantLeft { .. }))
        );
    }
}
