use crate::{Connection, Group, GroupId, ImportError, Node, NodeId, Transform};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Persisted / exported canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub canvas_name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub transform: Transform,
}

impl CanvasDocument {
    pub fn empty(canvas_name: impl Into<String>) -> Self {
        Self {
            canvas_name: canvas_name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            groups: Vec::new(),
            transform: Transform::default(),
        }
    }

    /// Structural validation: ids present and unique, every reference resolvable,
    /// no self loops or duplicate pairs, group membership consistent in both directions.
    pub fn validate(&self) -> Result<(), ImportError> {
        validate_parts(&self.nodes, &self.connections, &self.groups)
    }
}

/// Validation shared by documents and remote snapshots.
pub fn validate_parts(
    nodes: &[Node],
    connections: &[Connection],
    groups: &[Group],
) -> Result<(), ImportError> {
    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.id.0 == Uuid::nil() {
            return Err(ImportError::MissingId);
        }
        if !node_ids.insert(node.id) {
            return Err(ImportError::DuplicateNode(node.id));
        }
        if !node.position.is_finite() || !node.size.is_finite() {
            return Err(ImportError::InvalidGeometry(node.id));
        }
    }

    let mut connection_ids = HashSet::with_capacity(connections.len());
    let mut pairs = HashSet::with_capacity(connections.len());
    for conn in connections {
        if conn.id.0 == Uuid::nil() {
            return Err(ImportError::MissingId);
        }
        if !connection_ids.insert(conn.id) {
            return Err(ImportError::DuplicateConnection(conn.id));
        }
        for end in [conn.from_node_id, conn.to_node_id] {
            if !node_ids.contains(&end) {
                return Err(ImportError::DanglingConnection {
                    connection: conn.id,
                    node: end,
                });
            }
        }
        if conn.from_node_id == conn.to_node_id {
            return Err(ImportError::SelfLoop(conn.id));
        }
        let key = unordered_pair(conn.from_node_id, conn.to_node_id);
        if !pairs.insert(key) {
            return Err(ImportError::DuplicatePair(conn.id));
        }
    }

    let mut group_ids = HashSet::with_capacity(groups.len());
    let mut owner: HashMap<NodeId, GroupId> = HashMap::new();
    for group in groups {
        if group.id.0 == Uuid::nil() {
            return Err(ImportError::MissingId);
        }
        if !group_ids.insert(group.id) {
            return Err(ImportError::DuplicateGroup(group.id));
        }
        for &member in &group.node_ids {
            if !node_ids.contains(&member) {
                return Err(ImportError::DanglingMember {
                    group: group.id,
                    node: member,
                });
            }
            if owner.insert(member, group.id).is_some() {
                return Err(ImportError::SharedMember {
                    group: group.id,
                    node: member,
                });
            }
        }
    }

    for node in nodes {
        if node.group_id != owner.get(&node.id).copied() {
            return Err(ImportError::GroupMismatch {
                node: node.id,
                group: node.group_id,
            });
        }
    }

    Ok(())
}

fn unordered_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b { (a, b) } else { (b, a) }
}
