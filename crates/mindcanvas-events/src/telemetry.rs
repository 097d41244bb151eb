//! Lifecycle logging for the longer canvas commands: auto layout, import, save and
//! remote merge. Each command runs in a `tracing` span that carries the graph size it
//! started from; completion records the size it ended with and how long it took.

use std::time::Instant;
use tracing::{Span, field};
use uuid::Uuid;

const TARGET: &str = "mindcanvas::command";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasCommand {
    AutoLayout,
    Import,
    Save,
    RemoteMerge,
}

impl CanvasCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::AutoLayout => "auto_layout",
            Self::Import => "import",
            Self::Save => "save",
            Self::RemoteMerge => "remote_merge",
        }
    }
}

/// Entity counts attached to a command span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphSize {
    pub nodes: usize,
    pub connections: usize,
    pub groups: usize,
}

/// One running command. Consumed by [`CommandSpan::succeed`] or [`CommandSpan::fail`].
#[derive(Debug)]
pub struct CommandSpan {
    command: CanvasCommand,
    correlation_id: String,
    before: GraphSize,
    span: Span,
    started: Instant,
}

impl CommandSpan {
    pub fn start(command: CanvasCommand, before: GraphSize) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            target: TARGET,
            "canvas_command",
            command = command.name(),
            correlation_id = %correlation_id,
            nodes = before.nodes,
            connections = before.connections,
            groups = before.groups,
            outcome = field::Empty,
            duration_ms = field::Empty,
        );
        span.in_scope(|| tracing::debug!(target: TARGET, "started"));
        Self {
            command,
            correlation_id,
            before,
            span,
            started: Instant::now(),
        }
    }

    pub fn command(&self) -> CanvasCommand {
        self.command
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Attach a detail such as a file path or a peer id.
    pub fn note(&self, detail: &str) {
        self.span
            .in_scope(|| tracing::debug!(target: TARGET, detail, "context"));
    }

    /// Close the span and return the elapsed milliseconds.
    pub fn succeed(self, after: GraphSize) -> u64 {
        let elapsed = self.elapsed_ms();
        self.span.record("outcome", "success");
        self.span.record("duration_ms", elapsed);
        self.span.in_scope(|| {
            tracing::info!(
                target: TARGET,
                nodes_after = after.nodes,
                connections_after = after.connections,
                groups_after = after.groups,
                node_delta = after.nodes as i64 - self.before.nodes as i64,
                "{} finished in {} ms",
                self.command.name(),
                elapsed
            )
        });
        elapsed
    }

    pub fn fail(self, reason: &str) {
        let elapsed = self.elapsed_ms();
        self.span.record("outcome", "failure");
        self.span.record("duration_ms", elapsed);
        self.span.in_scope(|| {
            tracing::warn!(
                target: TARGET,
                reason,
                "{} failed after {} ms",
                self.command.name(),
                elapsed
            )
        });
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_get_distinct_correlation_ids() {
        let size = GraphSize {
            nodes: 3,
            connections: 2,
            groups: 1,
        };
        let a = CommandSpan::start(CanvasCommand::AutoLayout, size);
        let b = CommandSpan::start(CanvasCommand::AutoLayout, size);

        assert_ne!(a.correlation_id(), b.correlation_id());
        assert_eq!(a.correlation_id().len(), 36);
        assert_eq!(a.command(), CanvasCommand::AutoLayout);
        a.fail("cancelled");
        b.succeed(size);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(CanvasCommand::AutoLayout.name(), "auto_layout");
        assert_eq!(CanvasCommand::RemoteMerge.name(), "remote_merge");
    }
}
