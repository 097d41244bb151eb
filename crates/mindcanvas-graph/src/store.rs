//! The graph store: nodes, connections and groups with their referential invariants.
//!
//! Every mutator is total. Unknown ids, self loops and duplicate pairs are ignored and
//! reported through the return value (`false` / `None`) instead of an error, so callers
//! can tell whether a history entry is warranted.

use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use mindcanvas_core::{
    AnchorSide, Connection, ConnectionId, ConnectionPatch, Group, GroupId, ImportError, Node,
    NodeId, NodePatch, Vec2, validate_parts,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Partial update for a group. `node_ids` replaces the membership list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub node_ids: Option<Vec<NodeId>>,
}

/// Entities are held behind `Arc` so that cloning the graph for a history snapshot
/// copies pointers; only the entities a mutation touches are deep-copied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasGraph {
    nodes: IndexMap<NodeId, Arc<Node>>,
    connections: IndexMap<ConnectionId, Arc<Connection>>,
    groups: IndexMap<GroupId, Arc<Group>>,
}

impl CanvasGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from raw parts, rejecting anything that violates the invariants.
    /// Node sizes below the floor and `updated_at` stamps older than `created_at` are
    /// repaired.
    pub fn from_parts(
        nodes: Vec<Node>,
        connections: Vec<Connection>,
        groups: Vec<Group>,
    ) -> Result<Self, ImportError> {
        validate_parts(&nodes, &connections, &groups)?;

        let nodes = nodes
            .into_iter()
            .map(|mut node| {
                node.normalize();
                (node.id, Arc::new(node))
            })
            .collect();
        let connections = connections
            .into_iter()
            .map(|conn| (conn.id, Arc::new(conn)))
            .collect();
        let groups = groups
            .into_iter()
            .map(|group| (group.id, Arc::new(group)))
            .collect();

        Ok(Self {
            nodes,
            connections,
            groups,
        })
    }

    /// Owned copies of every entity, in z-order / insertion order.
    pub fn to_parts(&self) -> (Vec<Node>, Vec<Connection>, Vec<Group>) {
        (
            self.nodes.values().map(|n| Node::clone(n)).collect(),
            self.connections
                .values()
                .map(|c| Connection::clone(c))
                .collect(),
            self.groups.values().map(|g| Group::clone(g)).collect(),
        )
    }

    /// Re-check every referential invariant.
    pub fn validate(&self) -> Result<(), ImportError> {
        let (nodes, connections, groups) = self.to_parts();
        validate_parts(&nodes, &connections, &groups)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty() && self.groups.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id).map(Arc::as_ref)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id).map(Arc::as_ref)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in z-order (last is drawn on top).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().map(Arc::as_ref)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().map(Arc::as_ref)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// The connection joining `a` and `b` in either direction.
    pub fn connection_between(&self, a: NodeId, b: NodeId) -> Option<&Connection> {
        self.connections().find(|conn| conn.same_pair(a, b))
    }

    /// Connections whose both endpoints are in `ids`.
    pub fn induced_connections<'a>(
        &'a self,
        ids: &'a HashSet<NodeId>,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections()
            .filter(move |c| ids.contains(&c.from_node_id) && ids.contains(&c.to_node_id))
    }

    /// Whether two graphs share the same entity allocation for `id`.
    pub fn shares_node_with(&self, other: &CanvasGraph, id: NodeId) -> bool {
        match (self.nodes.get(&id), other.nodes.get(&id)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id).map(Arc::make_mut)
    }

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id).map(Arc::make_mut)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Create a text node with the minimum size at `position`.
    pub fn create_node(&mut self, position: Vec2) -> NodeId {
        let position = if position.is_finite() {
            position
        } else {
            Vec2::ZERO
        };
        let node = Node::new(position);
        let id = node.id;
        self.nodes.insert(id, Arc::new(node));
        id
    }

    /// Insert a fully formed node. Rejected if the id is taken. A claimed `group_id` is
    /// dropped; membership is assigned through group operations.
    pub fn insert_node(&mut self, mut node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            tracing::debug!("Ignoring insert of existing node {}", node.id);
            return false;
        }
        if !node.position.is_finite() {
            return false;
        }
        node.group_id = None;
        node.normalize();
        self.nodes.insert(node.id, Arc::new(node));
        true
    }

    pub fn update_node(&mut self, id: NodeId, patch: &NodePatch) -> bool {
        match self.node_mut(id) {
            Some(node) => node.apply(patch, Utc::now()),
            None => {
                tracing::debug!("Ignoring update of missing node {}", id);
                false
            }
        }
    }

    /// Move several nodes at once. Unknown ids are skipped; returns whether anything moved.
    pub fn set_positions(&mut self, positions: &[(NodeId, Vec2)]) -> bool {
        let now = Utc::now();
        let mut changed = false;
        for &(id, position) in positions {
            if !position.is_finite() {
                continue;
            }
            let needs_move = self
                .nodes
                .get(&id)
                .is_some_and(|node| node.position != position);
            if needs_move && let Some(node) = self.node_mut(id) {
                node.position = position;
                node.touch(now);
                changed = true;
            }
        }
        changed
    }

    /// Delete a node together with its incident connections and its group membership.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.shift_remove(&id) else {
            tracing::debug!("Ignoring delete of missing node {}", id);
            return false;
        };

        self.connections.retain(|_, conn| !conn.touches(id));

        if let Some(group_id) = node.group_id
            && let Some(group) = self.group_mut(group_id)
        {
            group.remove(id);
        }
        true
    }

    /// Delete every listed node; returns how many existed.
    pub fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        ids.iter().filter(|&&id| self.delete_node(id)).count()
    }

    /// Clone `ids` with fresh ids and timestamps, shifted by `offset`, along with the
    /// connections among them. Copies start outside any group.
    pub fn duplicate_nodes(&mut self, ids: &[NodeId], offset: Vec2) -> Vec<NodeId> {
        let now = Utc::now();
        let mut mapping: IndexMap<NodeId, NodeId> = IndexMap::new();

        for &id in ids {
            if mapping.contains_key(&id) {
                continue;
            }
            let Some(original) = self.node(id) else {
                continue;
            };
            let mut copy = original.clone();
            copy.id = NodeId::new();
            copy.position = original.position + offset;
            copy.group_id = None;
            copy.created_at = now;
            copy.updated_at = now;
            mapping.insert(id, copy.id);
            self.nodes.insert(copy.id, Arc::new(copy));
        }

        let copied_connections: Vec<Connection> = self
            .connections()
            .filter_map(|conn| {
                let from = mapping.get(&conn.from_node_id)?;
                let to = mapping.get(&conn.to_node_id)?;
                let mut copy = conn.clone();
                copy.id = ConnectionId::new();
                copy.from_node_id = *from;
                copy.to_node_id = *to;
                Some(copy)
            })
            .collect();
        for conn in copied_connections {
            self.connections.insert(conn.id, Arc::new(conn));
        }

        mapping.into_values().collect()
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Link `from` to `to`. Rejected for self loops, unknown nodes, or when any
    /// connection already joins the pair in either direction.
    pub fn create_connection(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_point: Option<AnchorSide>,
        to_point: Option<AnchorSide>,
    ) -> Option<ConnectionId> {
        if from == to {
            tracing::debug!("Ignoring self connection on {}", from);
            return None;
        }
        if !self.contains_node(from) || !self.contains_node(to) {
            tracing::debug!("Ignoring connection {} -> {} with missing node", from, to);
            return None;
        }
        if self.connection_between(from, to).is_some() {
            tracing::debug!("Ignoring duplicate connection {} -> {}", from, to);
            return None;
        }

        let conn = Connection::new(from, to).with_anchors(from_point, to_point);
        let id = conn.id;
        self.connections.insert(id, Arc::new(conn));
        Some(id)
    }

    pub fn update_connection(&mut self, id: ConnectionId, patch: &ConnectionPatch) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) => {
                let mut updated = (**conn).clone();
                if patch.apply(&mut updated) {
                    *conn = Arc::new(updated);
                    true
                } else {
                    false
                }
            }
            None => {
                tracing::debug!("Ignoring update of missing connection {}", id);
                false
            }
        }
    }

    pub fn delete_connection(&mut self, id: ConnectionId) -> bool {
        self.connections.shift_remove(&id).is_some()
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group and move the listed (existing) nodes into it, taking them out of
    /// whatever group held them before.
    pub fn create_group(&mut self, name: &str, color: &str, node_ids: &[NodeId]) -> GroupId {
        let group = Group::new(name, color);
        let id = group.id;
        self.groups.insert(id, Arc::new(group));
        for &node in node_ids {
            self.assign_to_group(node, id);
        }
        id
    }

    pub fn update_group(&mut self, id: GroupId, patch: &GroupPatch) -> bool {
        let Some(current) = self.group(id) else {
            tracing::debug!("Ignoring update of missing group {}", id);
            return false;
        };

        let rename = patch.name.as_ref().filter(|name| **name != current.name);
        let recolor = patch.color.as_ref().filter(|color| **color != current.color);
        let members = patch.node_ids.as_ref().map(|ids| {
            let mut seen = IndexSet::new();
            for &node in ids {
                if self.contains_node(node) {
                    seen.insert(node);
                }
            }
            seen.into_iter().collect::<Vec<_>>()
        });
        let members = members.filter(|ids| *ids != current.node_ids);

        if rename.is_none() && recolor.is_none() && members.is_none() {
            return false;
        }
        let rename = rename.cloned();
        let recolor = recolor.cloned();

        if let Some(group) = self.group_mut(id) {
            if let Some(name) = rename {
                group.name = name;
            }
            if let Some(color) = recolor {
                group.color = color;
            }
        }

        if let Some(members) = members {
            let previous = self
                .group(id)
                .map(|g| g.node_ids.clone())
                .unwrap_or_default();
            for node in previous.iter().filter(|n| !members.contains(n)) {
                self.clear_membership(*node);
            }
            for &node in &members {
                self.assign_to_group(node, id);
            }
            // Keep the caller's ordering.
            if let Some(group) = self.group_mut(id) {
                group.node_ids = members;
            }
        }
        true
    }

    /// Delete a group; its members stay on the canvas with `group_id` cleared.
    pub fn delete_group(&mut self, id: GroupId) -> bool {
        let Some(group) = self.groups.shift_remove(&id) else {
            tracing::debug!("Ignoring delete of missing group {}", id);
            return false;
        };
        for &node in &group.node_ids {
            if let Some(node) = self.node_mut(node) {
                node.group_id = None;
            }
        }
        true
    }

    /// Put `node` into `group`, leaving any previous group. Returns false if either id is
    /// unknown or the node was already a member.
    pub fn assign_to_group(&mut self, node: NodeId, group: GroupId) -> bool {
        if !self.groups.contains_key(&group) {
            return false;
        }
        let Some(previous) = self.node(node).map(|n| n.group_id) else {
            return false;
        };
        if previous == Some(group) {
            return false;
        }
        if let Some(previous) = previous
            && let Some(old) = self.group_mut(previous)
        {
            old.remove(node);
        }
        if let Some(target) = self.group_mut(group) {
            target.insert(node);
        }
        if let Some(n) = self.node_mut(node) {
            n.group_id = Some(group);
            n.touch(Utc::now());
        }
        true
    }

    /// Take `node` out of its group, if any.
    pub fn clear_membership(&mut self, node: NodeId) -> bool {
        let Some(Some(group)) = self.node(node).map(|n| n.group_id) else {
            return false;
        };
        if let Some(g) = self.group_mut(group) {
            g.remove(node);
        }
        if let Some(n) = self.node_mut(node) {
            n.group_id = None;
            n.touch(Utc::now());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindcanvas_core::{DEFAULT_GROUP_COLOR, MIN_NODE_HEIGHT, MIN_NODE_WIDTH, NodeContent};

    fn graph_with_nodes(count: usize) -> (CanvasGraph, Vec<NodeId>) {
        let mut graph = CanvasGraph::new();
        let ids = (0..count)
            .map(|i| graph.create_node(Vec2::new(i as f32 * 300.0, 0.0)))
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_create_node_defaults() {
        let mut graph = CanvasGraph::new();
        let id = graph.create_node(Vec2::new(5.0, 6.0));
        let node = graph.node(id).unwrap();

        assert_eq!(node.position, Vec2::new(5.0, 6.0));
        assert_eq!(node.size, Vec2::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT));
        assert!(matches!(node.content, NodeContent::Text { .. }));
        assert!(node.updated_at >= node.created_at);
    }

    #[test]
    fn test_update_missing_node_is_noop() {
        let (mut graph, _) = graph_with_nodes(1);
        let before = graph.clone();
        assert!(!graph.update_node(NodeId::new(), &NodePatch::position(Vec2::ZERO)));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_no_duplicate_connections_either_direction() {
        let (mut graph, ids) = graph_with_nodes(2);
        assert!(graph.create_connection(ids[0], ids[1], None, None).is_some());
        assert!(graph.create_connection(ids[1], ids[0], None, None).is_none());
        assert!(graph.create_connection(ids[0], ids[0], None, None).is_none());
        assert!(
            graph
                .create_connection(ids[0], NodeId::new(), None, None)
                .is_none()
        );
        assert_eq!(graph.connection_count(), 1);
    }

    #[test]
    fn test_delete_node_cascades() {
        let (mut graph, ids) = graph_with_nodes(3);
        graph.create_connection(ids[0], ids[1], None, None);
        graph.create_connection(ids[2], ids[0], None, None);
        graph.create_connection(ids[1], ids[2], None, None);
        let group = graph.create_group("G", "#000", &[ids[0], ids[1]]);

        assert!(graph.delete_node(ids[0]));

        assert_eq!(graph.connection_count(), 1);
        assert!(graph.connections().all(|c| !c.touches(ids[0])));
        assert_eq!(graph.group(group).unwrap().node_ids, vec![ids[1]]);
        assert_eq!(graph.validate(), Ok(()));
    }

    #[test]
    fn test_create_group_reassigns_from_previous_group() {
        let (mut graph, ids) = graph_with_nodes(3);
        let first = graph.create_group("A", "#111", &[ids[0], ids[1]]);
        let second = graph.create_group("B", "#222", &[ids[1], ids[2], NodeId::new()]);

        assert_eq!(graph.group(first).unwrap().node_ids, vec![ids[0]]);
        assert_eq!(graph.group(second).unwrap().node_ids, vec![ids[1], ids[2]]);
        assert_eq!(graph.node(ids[1]).unwrap().group_id, Some(second));
        assert_eq!(graph.validate(), Ok(()));
    }

    #[test]
    fn test_delete_group_keeps_nodes() {
        let (mut graph, ids) = graph_with_nodes(2);
        let group = graph.create_group("G", "#000", &ids);

        assert!(graph.delete_group(group));

        assert_eq!(graph.node_count(), 2);
        assert!(graph.nodes().all(|n| n.group_id.is_none()));
        assert_eq!(graph.validate(), Ok(()));
    }

    #[test]
    fn test_update_group_membership_replaces_members() {
        let (mut graph, ids) = graph_with_nodes(3);
        let group = graph.create_group("G", "#000", &[ids[0], ids[1]]);

        let changed = graph.update_group(
            group,
            &GroupPatch {
                node_ids: Some(vec![ids[2], ids[1], ids[2]]),
                ..Default::default()
            },
        );

        assert!(changed);
        assert_eq!(graph.group(group).unwrap().node_ids, vec![ids[2], ids[1]]);
        assert_eq!(graph.node(ids[0]).unwrap().group_id, None);
        assert_eq!(graph.validate(), Ok(()));
        assert!(!graph.update_group(
            group,
            &GroupPatch {
                name: Some("G".to_string()),
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_duplicate_copies_internal_connections_only() {
        let (mut graph, ids) = graph_with_nodes(3);
        graph.create_connection(ids[0], ids[1], Some(AnchorSide::Right), None);
        graph.create_connection(ids[1], ids[2], None, None);
        graph.create_group("G", "#000", &[ids[0]]);

        let copies = graph.duplicate_nodes(&[ids[0], ids[1]], Vec2::new(20.0, 20.0));

        assert_eq!(copies.len(), 2);
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.connection_count(), 3);
        let copied = graph.connection_between(copies[0], copies[1]).unwrap();
        assert_eq!(copied.from_point, Some(AnchorSide::Right));
        assert_eq!(graph.node(copies[0]).unwrap().group_id, None);
        assert_eq!(
            graph.node(copies[0]).unwrap().position,
            graph.node(ids[0]).unwrap().position + Vec2::new(20.0, 20.0)
        );
        assert_eq!(graph.validate(), Ok(()));
    }

    #[test]
    fn test_clone_shares_untouched_entities() {
        let (mut graph, ids) = graph_with_nodes(2);
        let snapshot = graph.clone();

        graph.update_node(ids[0], &NodePatch::position(Vec2::new(1.0, 1.0)));

        assert!(!graph.shares_node_with(&snapshot, ids[0]));
        assert!(graph.shares_node_with(&snapshot, ids[1]));
        assert_eq!(snapshot.node(ids[0]).unwrap().position, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_from_parts_rejects_invalid_and_clamps_sizes() {
        let mut small = Node::new(Vec2::ZERO);
        small.size = Vec2::new(10.0, 10.0);
        let graph = CanvasGraph::from_parts(vec![small.clone()], vec![], vec![]).unwrap();
        assert_eq!(
            graph.node(small.id).unwrap().size,
            Vec2::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT)
        );

        let dangling = Connection::new(small.id, NodeId::new());
        assert!(CanvasGraph::from_parts(vec![small], vec![dangling], vec![]).is_err());
    }

    #[test]
    fn test_from_parts_repairs_backdated_update_stamp() {
        let mut node = Node::new(Vec2::ZERO);
        node.updated_at = node.created_at - chrono::Duration::days(1);

        let graph = CanvasGraph::from_parts(vec![node.clone()], vec![], vec![]).unwrap();

        let loaded = graph.node(node.id).unwrap();
        assert_eq!(loaded.updated_at, loaded.created_at);
    }

    #[test]
    fn test_membership_changes_restamp_node() {
        let mut graph = CanvasGraph::new();
        let mut node = Node::new(Vec2::ZERO);
        node.created_at -= chrono::Duration::days(2);
        node.updated_at = node.created_at;
        let stale = node.updated_at;
        let id = node.id;
        assert!(graph.insert_node(node));
        let group = graph.create_group("G", DEFAULT_GROUP_COLOR, &[]);

        assert!(graph.assign_to_group(id, group));
        let assigned = graph.node(id).unwrap().updated_at;
        assert!(assigned > stale);

        assert!(graph.clear_membership(id));
        assert!(graph.node(id).unwrap().updated_at >= assigned);
        assert_eq!(graph.node(id).unwrap().group_id, None);
    }
}
