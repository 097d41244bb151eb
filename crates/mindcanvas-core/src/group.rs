use crate::{GroupId, NodeId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_COLOR: &str = "#3b82f6";

/// Named, colored cluster of nodes. `node_ids` keeps insertion order and holds no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub node_ids: Vec<NodeId>,
}

impl Group {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            color: color.into(),
            node_ids: Vec::new(),
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.node_ids.contains(&node)
    }

    /// Returns false if the node was already a member.
    pub fn insert(&mut self, node: NodeId) -> bool {
        if self.contains(node) {
            return false;
        }
        self.node_ids.push(node);
        true
    }

    /// Returns false if the node was not a member.
    pub fn remove(&mut self, node: NodeId) -> bool {
        let before = self.node_ids.len();
        self.node_ids.retain(|id| *id != node);
        self.node_ids.len() != before
    }
}
