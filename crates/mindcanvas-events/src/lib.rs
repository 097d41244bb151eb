use crossbeam_channel::{Receiver, Sender, unbounded};
use mindcanvas_core::{ConnectionId, GroupId, NodeId};
use serde::{Deserialize, Serialize};

pub mod collab;
pub mod telemetry;

pub use collab::{
    CanvasData, CollabEvent, CollaborationTransport, InMemoryTransport, JoinResponse,
    Participant, Presence, ROOM_CAPACITY, TransportError,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Typed messages exchanged between the canvas engine and whatever shell hosts it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    // Graph
    NodeCreated {
        id: NodeId,
    },
    NodesDeleted {
        ids: Vec<NodeId>,
    },
    ConnectionCreated {
        id: ConnectionId,
        from: NodeId,
        to: NodeId,
    },
    GroupCreated {
        id: GroupId,
    },
    GroupDeleted {
        id: GroupId,
    },
    GraphReplaced {
        node_count: usize,
        connection_count: usize,
        group_count: usize,
    },

    // History
    HistoryChanged {
        can_undo: bool,
        can_redo: bool,
    },

    // Selection / view
    SelectionChanged {
        ids: Vec<NodeId>,
    },
    /// Ask the shell to open the group editor, optionally pre-filled with members.
    OpenGroupDialog {
        group_id: Option<GroupId>,
        node_ids: Vec<NodeId>,
    },
    /// Highlight a group outline; `None` clears the highlight.
    HighlightGroup {
        group_id: Option<GroupId>,
    },

    // Layout
    LayoutStarted {
        node_count: usize,
    },
    LayoutCompleted {
        node_count: usize,
        iterations: usize,
        converged: bool,
    },
    LayoutCancelled,

    // Persistence
    ImportRejected {
        reason: String,
    },
    StorageExhausted {
        required_bytes: u64,
        quota_bytes: u64,
    },
    CanvasSaved {
        name: String,
    },

    // Collaboration
    RemoteUpdateApplied {
        updated_by: String,
    },
    RemoteUpdateRejected {
        updated_by: String,
        reason: String,
    },
    ParticipantLeft {
        user_id: String,
    },

    // Notifications
    Notify {
        level: NotificationLevel,
        message: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Dispatch all pending events to a listener.
    /// This is useful for processing events in the UI loop.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<Event>,
    }

    impl EventListener for Recorder {
        fn handle_event(&mut self, event: &Event) {
            self.seen.push(event.clone());
        }
    }

    #[test]
    fn test_event_bus_publish_receive() {
        let bus = EventBus::new();
        let id = NodeId::new();

        bus.publish(Event::NodeCreated { id });

        match bus.receiver().recv().unwrap() {
            Event::NodeCreated { id: received } => assert_eq!(received, id),
            other => panic!("Expected NodeCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_to_listener_preserves_order() {
        let bus = EventBus::new();
        bus.publish(Event::LayoutStarted { node_count: 3 });
        bus.publish(Event::LayoutCompleted {
            node_count: 3,
            iterations: 42,
            converged: true,
        });
        bus.publish(Event::HistoryChanged {
            can_undo: true,
            can_redo: false,
        });

        let mut recorder = Recorder::default();
        bus.dispatch_to(&mut recorder);

        assert_eq!(recorder.seen.len(), 3);
        assert!(matches!(
            recorder.seen[0],
            Event::LayoutStarted { node_count: 3 }
        ));
        assert!(matches!(
            recorder.seen[2],
            Event::HistoryChanged {
                can_undo: true,
                can_redo: false
            }
        ));
        assert!(bus.drain().is_empty());
    }
}
