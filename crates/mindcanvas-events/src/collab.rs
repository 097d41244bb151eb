//! Collaboration boundary: the request/response operations of the shared-canvas
//! service plus the per-canvas event channel. The canvas engine only consumes
//! `canvas_update` and re-emits its own commits; the transport itself lives
//! outside the engine.

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use mindcanvas_core::{Connection, Group, Node, NodeId, Vec2};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of participants in one shared canvas.
pub const ROOM_CAPACITY: usize = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown canvas {0}")]
    UnknownCanvas(String),
    #[error("Canvas is full ({capacity} participants)")]
    RoomFull { capacity: usize },
    #[error("User {0} is not part of this canvas")]
    NotAParticipant(String),
}

/// The shared part of a canvas: everything except the per-user viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasData {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub cursor: Option<Vec2>,
    #[serde(default)]
    pub selected: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollabEvent {
    CanvasUpdate {
        data: CanvasData,
        #[serde(rename = "updatedBy")]
        updated_by: String,
        timestamp: DateTime<Utc>,
    },
    PresenceUpdate {
        presence: Vec<Presence>,
    },
    UserLeft {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub canvas_id: String,
    pub user_id: String,
    pub name: String,
    pub data: CanvasData,
    pub participants: Vec<Participant>,
}

pub trait CollaborationTransport: Send + Sync {
    fn create(&self, name: &str, initial: CanvasData) -> Result<String, TransportError>;
    fn join(&self, canvas_id: &str, user_name: &str) -> Result<JoinResponse, TransportError>;
    fn update_data(
        &self,
        canvas_id: &str,
        user_id: &str,
        data: CanvasData,
    ) -> Result<(), TransportError>;
    fn update_presence(&self, canvas_id: &str, presence: Presence) -> Result<(), TransportError>;
    fn leave(&self, canvas_id: &str, user_id: &str) -> Result<(), TransportError>;
    fn subscribe(&self, canvas_id: &str) -> Result<Receiver<CollabEvent>, TransportError>;
}

struct Room {
    name: String,
    data: CanvasData,
    participants: Vec<Participant>,
    presence: HashMap<String, Presence>,
    subscribers: Vec<Sender<CollabEvent>>,
}

impl Room {
    fn broadcast(&mut self, event: CollabEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn require_participant(&self, user_id: &str) -> Result<(), TransportError> {
        if self.participants.iter().any(|p| p.user_id == user_id) {
            Ok(())
        } else {
            Err(TransportError::NotAParticipant(user_id.to_string()))
        }
    }

    fn presence_snapshot(&self) -> Vec<Presence> {
        let mut presence: Vec<Presence> = self.presence.values().cloned().collect();
        presence.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        presence
    }
}

/// Process-local transport: rooms live in memory and events fan out over channels.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self, canvas_id: &str) -> Vec<Participant> {
        self.rooms
            .lock()
            .get(canvas_id)
            .map(|room| room.participants.clone())
            .unwrap_or_default()
    }
}

impl CollaborationTransport for InMemoryTransport {
    fn create(&self, name: &str, initial: CanvasData) -> Result<String, TransportError> {
        let canvas_id = Uuid::new_v4().to_string();
        self.rooms.lock().insert(
            canvas_id.clone(),
            Room {
                name: name.to_string(),
                data: initial,
                participants: Vec::new(),
                presence: HashMap::new(),
                subscribers: Vec::new(),
            },
        );
        tracing::debug!(canvas_id = %canvas_id, name, "collaboration room created");
        Ok(canvas_id)
    }

    fn join(&self, canvas_id: &str, user_name: &str) -> Result<JoinResponse, TransportError> {
        let mut rooms = self.rooms.lock();
        let room = rooms
            .get_mut(canvas_id)
            .ok_or_else(|| TransportError::UnknownCanvas(canvas_id.to_string()))?;
        if room.participants.len() >= ROOM_CAPACITY {
            return Err(TransportError::RoomFull {
                capacity: ROOM_CAPACITY,
            });
        }

        let participant = Participant {
            user_id: Uuid::new_v4().to_string(),
            user_name: user_name.to_string(),
        };
        room.participants.push(participant.clone());
        room.presence.insert(
            participant.user_id.clone(),
            Presence {
                user_id: participant.user_id.clone(),
                user_name: participant.user_name.clone(),
                cursor: None,
                selected: Vec::new(),
            },
        );
        let presence = room.presence_snapshot();
        room.broadcast(CollabEvent::PresenceUpdate { presence });

        Ok(JoinResponse {
            canvas_id: canvas_id.to_string(),
            user_id: participant.user_id,
            name: room.name.clone(),
            data: room.data.clone(),
            participants: room.participants.clone(),
        })
    }

    fn update_data(
        &self,
        canvas_id: &str,
        user_id: &str,
        data: CanvasData,
    ) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let room = rooms
            .get_mut(canvas_id)
            .ok_or_else(|| TransportError::UnknownCanvas(canvas_id.to_string()))?;
        room.require_participant(user_id)?;

        room.data = data.clone();
        room.broadcast(CollabEvent::CanvasUpdate {
            data,
            updated_by: user_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn update_presence(&self, canvas_id: &str, presence: Presence) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let room = rooms
            .get_mut(canvas_id)
            .ok_or_else(|| TransportError::UnknownCanvas(canvas_id.to_string()))?;
        room.require_participant(&presence.user_id)?;

        room.presence.insert(presence.user_id.clone(), presence);
        let snapshot = room.presence_snapshot();
        room.broadcast(CollabEvent::PresenceUpdate { presence: snapshot });
        Ok(())
    }

    fn leave(&self, canvas_id: &str, user_id: &str) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let room = rooms
            .get_mut(canvas_id)
            .ok_or_else(|| TransportError::UnknownCanvas(canvas_id.to_string()))?;
        room.require_participant(user_id)?;

        room.participants.retain(|p| p.user_id != user_id);
        room.presence.remove(user_id);
        room.broadcast(CollabEvent::UserLeft {
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self, canvas_id: &str) -> Result<Receiver<CollabEvent>, TransportError> {
        let mut rooms = self.rooms.lock();
        let room = rooms
            .get_mut(canvas_id)
            .ok_or_else(|| TransportError::UnknownCanvas(canvas_id.to_string()))?;
        let (tx, rx) = unbounded();
        room.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_capacity_is_two() {
        let transport = InMemoryTransport::new();
        let canvas_id = transport.create("Board", CanvasData::default()).unwrap();

        transport.join(&canvas_id, "ana").unwrap();
        transport.join(&canvas_id, "ben").unwrap();
        let third = transport.join(&canvas_id, "cy");

        assert_eq!(third, Err(TransportError::RoomFull { capacity: 2 }));
        assert_eq!(transport.participants(&canvas_id).len(), 2);
    }

    #[test]
    fn test_update_data_broadcasts_canvas_update() {
        let transport = InMemoryTransport::new();
        let canvas_id = transport.create("Board", CanvasData::default()).unwrap();
        let joined = transport.join(&canvas_id, "ana").unwrap();
        let events = transport.subscribe(&canvas_id).unwrap();

        let data = CanvasData {
            nodes: vec![Node::new(Vec2::new(1.0, 2.0))],
            ..Default::default()
        };
        transport
            .update_data(&canvas_id, &joined.user_id, data.clone())
            .unwrap();

        match events.try_recv().unwrap() {
            CollabEvent::CanvasUpdate {
                data: received,
                updated_by,
                ..
            } => {
                assert_eq!(received, data);
                assert_eq!(updated_by, joined.user_id);
            }
            other => panic!("Expected CanvasUpdate, got {other:?}"),
        }

        let late = transport.join(&canvas_id, "ben").unwrap();
        assert_eq!(late.data, data);
    }

    #[test]
    fn test_leave_emits_user_left() {
        let transport = InMemoryTransport::new();
        let canvas_id = transport.create("Board", CanvasData::default()).unwrap();
        let joined = transport.join(&canvas_id, "ana").unwrap();
        let events = transport.subscribe(&canvas_id).unwrap();

        transport.leave(&canvas_id, &joined.user_id).unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            CollabEvent::UserLeft {
                user_id: joined.user_id.clone()
            }
        );
        assert!(matches!(
            transport.leave(&canvas_id, &joined.user_id),
            Err(TransportError::NotAParticipant(_))
        ));
    }

    #[test]
    fn test_event_wire_names() {
        let event = CollabEvent::UserLeft {
            user_id: "u1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_left");
        assert_eq!(json["userId"], "u1");
    }
}
