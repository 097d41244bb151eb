use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod connection;
pub mod document;
pub mod error;
pub mod group;
pub mod math;
pub mod node;
pub mod transform;

pub use connection::{AnchorSide, Connection, ConnectionPatch, DEFAULT_CONNECTION_COLOR};
pub use document::{CanvasDocument, validate_parts};
pub use error::ImportError;
pub use group::{DEFAULT_GROUP_COLOR, Group};
pub use math::{Rect, Vec2};
pub use node::{
    DEFAULT_NODE_COLOR, LinkRef, MIN_NODE_HEIGHT, MIN_NODE_WIDTH, Node, NodeContent, NodePatch,
    clamp_size,
};
pub use transform::{MAX_SCALE, MIN_SCALE, SelectionBox, Transform, clamp_scale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_transparent() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.0));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
