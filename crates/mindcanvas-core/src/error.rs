use crate::{ConnectionId, GroupId, NodeId};
use thiserror::Error;

/// Reasons a canvas document is rejected before it can replace the live graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Malformed document: {0}")]
    Parse(String),
    #[error("Entity is missing an id")]
    MissingId,
    #[error("Duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("Duplicate connection id {0}")]
    DuplicateConnection(ConnectionId),
    #[error("Duplicate group id {0}")]
    DuplicateGroup(GroupId),
    #[error("Node {0} has a non-finite position or size")]
    InvalidGeometry(NodeId),
    #[error("Connection {connection} references missing node {node}")]
    DanglingConnection {
        connection: ConnectionId,
        node: NodeId,
    },
    #[error("Connection {0} links a node to itself")]
    SelfLoop(ConnectionId),
    #[error("Connection {0} duplicates an existing node pair")]
    DuplicatePair(ConnectionId),
    #[error("Group {group} lists missing node {node}")]
    DanglingMember { group: GroupId, node: NodeId },
    #[error("Node {node} is listed by more than one group (including {group})")]
    SharedMember { group: GroupId, node: NodeId },
    #[error("Node {node} claims group {group:?} but membership disagrees")]
    GroupMismatch {
        node: NodeId,
        group: Option<GroupId>,
    },
}
