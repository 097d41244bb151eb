//! `Canvas` owns one editing session: the history-backed graph, the view transform and
//! the selection. Every graph mutation goes through [`Canvas::transact`], which records a
//! single history entry only when the graph actually changed.

use crate::geometry::{self, ZOOM_STEP};
use crate::history::History;
use crate::layout::{CancellationToken, ForceLayouter, LayoutInput, LayoutOutcome, Layouter};
use crate::store::{CanvasGraph, GroupPatch};
use indexmap::IndexSet;
use mindcanvas_core::{
    AnchorSide, CanvasDocument, ConnectionId, ConnectionPatch, DEFAULT_GROUP_COLOR, GroupId,
    ImportError, MIN_NODE_HEIGHT, MIN_NODE_WIDTH, NodeId, NodePatch, Transform, Vec2,
};
use mindcanvas_events::{CanvasData, Event, EventBus};

/// Offset applied to duplicated nodes, in world units.
pub const DUPLICATE_OFFSET: Vec2 = Vec2::new(20.0, 20.0);
pub const DEFAULT_GROUP_NAME: &str = "Group";

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasOptions {
    pub history_limit: Option<usize>,
    /// World-space padding around the content for fit-to-screen.
    pub fit_padding: f32,
    /// Fit-to-screen never zooms in past this scale.
    pub max_fit_zoom: f32,
    pub zoom_step: f32,
    pub viewport: Vec2,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            history_limit: None,
            fit_padding: 50.0,
            max_fit_zoom: 1.0,
            zoom_step: ZOOM_STEP,
            viewport: Vec2::new(1280.0, 800.0),
        }
    }
}

#[derive(Debug)]
pub struct Canvas {
    name: String,
    history: History,
    transform: Transform,
    selection: IndexSet<NodeId>,
    options: CanvasOptions,
    events: EventBus,
}

impl Canvas {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, CanvasOptions::default(), EventBus::new())
    }

    pub fn with_options(name: impl Into<String>, options: CanvasOptions, events: EventBus) -> Self {
        Self {
            name: name.into(),
            history: History::default().with_limit(options.history_limit),
            transform: Transform::IDENTITY,
            selection: IndexSet::new(),
            options,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn graph(&self) -> &CanvasGraph {
        self.history.present()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn options(&self) -> &CanvasOptions {
        &self.options
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Run `apply` against a copy of the present graph and commit the result if it
    /// differs. Returns the closure's result and whether a history entry was recorded.
    pub fn transact<R>(&mut self, apply: impl FnOnce(&mut CanvasGraph) -> R) -> (R, bool) {
        let mut next = self.history.present().clone();
        let result = apply(&mut next);
        let changed = next != *self.history.present();
        if changed {
            self.history.commit(next);
            self.publish_history();
        }
        (result, changed)
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.undo() {
            return false;
        }
        self.after_time_travel();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.redo() {
            return false;
        }
        self.after_time_travel();
        true
    }

    fn after_time_travel(&mut self) {
        self.publish_history();
        self.prune_selection();
    }

    fn publish_history(&self) {
        self.events.publish(Event::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        });
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, position: Vec2) -> NodeId {
        let (id, _) = self.transact(|graph| graph.create_node(position));
        self.events.publish(Event::NodeCreated { id });
        id
    }

    /// Add a node centred in the current viewport.
    pub fn add_node_at_center(&mut self) -> NodeId {
        let center = geometry::screen_to_world(self.options.viewport * 0.5, &self.transform);
        self.add_node(center - Vec2::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT) * 0.5)
    }

    pub fn update_node(&mut self, id: NodeId, patch: &NodePatch) -> bool {
        self.transact(|graph| graph.update_node(id, patch)).1
    }

    /// Move several nodes as one history entry.
    pub fn move_nodes(&mut self, positions: &[(NodeId, Vec2)]) -> bool {
        self.transact(|graph| graph.set_positions(positions)).1
    }

    pub fn delete_node(&mut self, id: NodeId) -> bool {
        self.delete_nodes(&[id]) > 0
    }

    pub fn delete_nodes(&mut self, ids: &[NodeId]) -> usize {
        let existing: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| self.graph().contains_node(*id))
            .collect();
        let (removed, _) = self.transact(|graph| graph.delete_nodes(&existing));
        if removed > 0 {
            self.events.publish(Event::NodesDeleted { ids: existing });
            self.prune_selection();
        }
        removed
    }

    pub fn delete_selection(&mut self) -> usize {
        let ids = self.selected_ids();
        self.delete_nodes(&ids)
    }

    /// Duplicate the selection and select the copies.
    pub fn duplicate_selection(&mut self) -> Vec<NodeId> {
        let ids = self.selected_ids();
        if ids.is_empty() {
            return Vec::new();
        }
        let (copies, _) = self.transact(|graph| graph.duplicate_nodes(&ids, DUPLICATE_OFFSET));
        for id in &copies {
            self.events.publish(Event::NodeCreated { id: *id });
        }
        self.set_selection(&copies);
        copies
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_point: Option<AnchorSide>,
        to_point: Option<AnchorSide>,
    ) -> Option<ConnectionId> {
        let (id, _) =
            self.transact(|graph| graph.create_connection(from, to, from_point, to_point));
        if let Some(id) = id {
            self.events
                .publish(Event::ConnectionCreated { id, from, to });
        }
        id
    }

    pub fn update_connection(&mut self, id: ConnectionId, patch: &ConnectionPatch) -> bool {
        self.transact(|graph| graph.update_connection(id, patch)).1
    }

    pub fn delete_connection(&mut self, id: ConnectionId) -> bool {
        self.transact(|graph| graph.delete_connection(id)).1
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub fn create_group(&mut self, name: &str, color: &str, node_ids: &[NodeId]) -> GroupId {
        let (id, _) = self.transact(|graph| graph.create_group(name, color, node_ids));
        self.events.publish(Event::GroupCreated { id });
        id
    }

    /// Group the current selection. `None` when nothing is selected.
    pub fn group_selection(&mut self, name: &str) -> Option<GroupId> {
        let ids = self.selected_ids();
        if ids.is_empty() {
            return None;
        }
        let id = self.create_group(name, DEFAULT_GROUP_COLOR, &ids);
        self.events
            .publish(Event::HighlightGroup { group_id: Some(id) });
        Some(id)
    }

    pub fn update_group(&mut self, id: GroupId, patch: &GroupPatch) -> bool {
        self.transact(|graph| graph.update_group(id, patch)).1
    }

    pub fn delete_group(&mut self, id: GroupId) -> bool {
        let (_, changed) = self.transact(|graph| graph.delete_group(id));
        if changed {
            self.events.publish(Event::GroupDeleted { id });
        }
        changed
    }

    /// Ask the host to open the group editor for the current selection.
    pub fn request_group_dialog(&self) {
        self.events.publish(Event::OpenGroupDialog {
            group_id: None,
            node_ids: self.selected_ids(),
        });
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Snapshot the given nodes for a layout run.
    pub fn layout_input(&self, ids: &[NodeId]) -> LayoutInput {
        LayoutInput::from_graph(self.graph(), ids)
    }

    /// Arrange `ids` synchronously and commit the result as one history entry.
    pub fn auto_layout(&mut self, ids: &[NodeId]) -> Option<LayoutOutcome> {
        let input = self.layout_input(ids);
        if input.len() < 2 {
            tracing::debug!("Skipping layout of {} node(s)", input.len());
            return None;
        }
        self.events.publish(Event::LayoutStarted {
            node_count: input.len(),
        });
        let outcome = ForceLayouter.execute(&input, &CancellationToken::new())?;
        self.apply_layout(&outcome);
        Some(outcome)
    }

    /// Commit a finished layout. Nodes deleted since the run started are skipped.
    pub fn apply_layout(&mut self, outcome: &LayoutOutcome) -> bool {
        let (_, changed) = self.transact(|graph| graph.set_positions(&outcome.positions));
        tracing::info!(
            "Layout of {} nodes applied after {} iterations (converged: {})",
            outcome.positions.len(),
            outcome.iterations,
            outcome.converged
        );
        self.events.publish(Event::LayoutCompleted {
            node_count: outcome.positions.len(),
            iterations: outcome.iterations,
            converged: outcome.converged,
        });
        changed
    }

    // ------------------------------------------------------------------
    // Whole-graph replacement
    // ------------------------------------------------------------------

    /// Replace every node, connection and group as one undoable step.
    pub fn replace_graph(&mut self, graph: CanvasGraph) -> bool {
        let (_, changed) = self.transact(|current| *current = graph);
        if changed {
            let graph = self.graph();
            self.events.publish(Event::GraphReplaced {
                node_count: graph.node_count(),
                connection_count: graph.connection_count(),
                group_count: graph.group_count(),
            });
            self.prune_selection();
        }
        changed
    }

    /// The shared part of the canvas, as exchanged with collaborators.
    pub fn canvas_data(&self) -> CanvasData {
        let (nodes, connections, groups) = self.graph().to_parts();
        CanvasData {
            nodes,
            connections,
            groups,
        }
    }

    /// Validate and apply a full snapshot. Invalid data leaves the canvas untouched.
    pub fn apply_canvas_data(&mut self, data: CanvasData) -> Result<bool, ImportError> {
        let graph = CanvasGraph::from_parts(data.nodes, data.connections, data.groups)?;
        Ok(self.replace_graph(graph))
    }

    pub fn to_document(&self) -> CanvasDocument {
        let (nodes, connections, groups) = self.graph().to_parts();
        CanvasDocument {
            canvas_name: self.name.clone(),
            nodes,
            connections,
            groups,
            transform: self.transform,
        }
    }

    /// Import a document. On failure an `ImportRejected` event is published and nothing
    /// changes.
    pub fn load_document(&mut self, document: CanvasDocument) -> Result<(), ImportError> {
        let graph = match CanvasGraph::from_parts(
            document.nodes,
            document.connections,
            document.groups,
        ) {
            Ok(graph) => graph,
            Err(err) => {
                tracing::warn!("Rejected canvas import: {}", err);
                self.events.publish(Event::ImportRejected {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };
        self.name = document.canvas_name;
        self.transform = document.transform;
        self.replace_graph(graph);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn selection(&self) -> &IndexSet<NodeId> {
        &self.selection
    }

    pub fn selected_ids(&self) -> Vec<NodeId> {
        self.selection.iter().copied().collect()
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.selection.contains(&id)
    }

    /// Replace the selection; unknown ids are dropped.
    pub fn set_selection(&mut self, ids: &[NodeId]) {
        let next: IndexSet<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| self.graph().contains_node(*id))
            .collect();
        if next != self.selection {
            self.selection = next;
            self.publish_selection();
        }
    }

    pub fn add_to_selection(&mut self, id: NodeId) {
        if self.graph().contains_node(id) && self.selection.insert(id) {
            self.publish_selection();
        }
    }

    pub fn toggle_selection(&mut self, id: NodeId) {
        if self.selection.shift_remove(&id) {
            self.publish_selection();
        } else {
            self.add_to_selection(id);
        }
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.publish_selection();
        }
    }

    fn prune_selection(&mut self) {
        let before = self.selection.len();
        let graph = self.history.present();
        self.selection.retain(|id| graph.contains_node(*id));
        if self.selection.len() != before {
            self.publish_selection();
        }
    }

    fn publish_selection(&self) {
        self.events.publish(Event::SelectionChanged {
            ids: self.selected_ids(),
        });
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn viewport(&self) -> Vec2 {
        self.options.viewport
    }

    pub fn set_viewport(&mut self, viewport: Vec2) {
        if viewport.is_finite() && viewport.x > 0.0 && viewport.y > 0.0 {
            self.options.viewport = viewport;
        }
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.transform.pan_by(delta);
    }

    pub fn zoom_at(&mut self, screen: Vec2, factor: f32) {
        self.transform = geometry::zoom_at_point(&self.transform, screen, factor);
    }

    pub fn zoom_in(&mut self) {
        self.transform = geometry::zoom_about_center(
            &self.transform,
            self.options.viewport,
            self.options.zoom_step,
        );
    }

    pub fn zoom_out(&mut self) {
        self.transform = geometry::zoom_about_center(
            &self.transform,
            self.options.viewport,
            1.0 / self.options.zoom_step,
        );
    }

    pub fn fit_to_screen(&mut self) {
        self.transform = geometry::fit_to_bounds(
            self.history.present().nodes(),
            self.options.viewport,
            self.options.fit_padding,
            self.options.max_fit_zoom,
        );
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        geometry::screen_to_world(screen, &self.transform)
    }
}
