//! Pointer and keyboard state machine driving a [`Canvas`].
//!
//! States: Idle, Panning, RectSelecting, DraggingNode, ResizingNode, Connecting.
//! Drags and resizes render from a preview and touch the store once, on pointer-up.

use crate::canvas::{Canvas, DEFAULT_GROUP_NAME};
use crate::geometry::{self, CubicBezier};
use crate::hit_tester::{HitResult, HitTester};
use mindcanvas_core::{AnchorSide, NodeId, NodePatch, Rect, SelectionBox, Vec2, clamp_size};
use mindcanvas_events::{Event, NotificationLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Additive selection.
    pub shift: bool,
    /// Primary-drag on the background pans instead of selecting.
    pub alt: bool,
    pub ctrl: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub button: PointerButton,
    /// Screen-space position.
    pub screen: Vec2,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, button: PointerButton, screen: Vec2) -> Self {
        Self {
            kind,
            button,
            screen,
            modifiers: Modifiers::default(),
        }
    }

    pub fn down(screen: Vec2) -> Self {
        Self::new(PointerKind::Down, PointerButton::Primary, screen)
    }

    pub fn moved(screen: Vec2) -> Self {
        Self::new(PointerKind::Move, PointerButton::Primary, screen)
    }

    pub fn up(screen: Vec2) -> Self {
        Self::new(PointerKind::Up, PointerButton::Primary, screen)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    AddNode,
    AddGroup,
    DeleteSelection,
    Duplicate,
    Undo,
    Redo,
    GroupSelection,
    FitToScreen,
    ZoomIn,
    ZoomOut,
    Cancel,
    AutoLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Panning {
        last_screen: Vec2,
    },
    RectSelecting {
        selection: SelectionBox,
        additive: bool,
    },
    DraggingNode {
        grab_world: Vec2,
        origins: Vec<(NodeId, Vec2)>,
        offset: Vec2,
    },
    ResizingNode {
        node_id: NodeId,
        grab_world: Vec2,
        origin_size: Vec2,
        size: Vec2,
    },
    Connecting {
        from: NodeId,
        side: AnchorSide,
        pointer_world: Vec2,
        /// Set once the pointer has left the source handle; releasing after that
        /// completes or cancels the connection instead of waiting for a second click.
        dragged: bool,
    },
}

/// What the host should do after an input was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ignored,
    Handled,
    /// Arrange these nodes, typically on a background job.
    LayoutRequested(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    state: InteractionState,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            state: InteractionState::Idle,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InteractionState::Idle
    }

    // ------------------------------------------------------------------
    // Previews
    // ------------------------------------------------------------------

    /// Positions to draw while a drag is in progress.
    pub fn drag_preview(&self) -> Option<Vec<(NodeId, Vec2)>> {
        match &self.state {
            InteractionState::DraggingNode {
                origins, offset, ..
            } => Some(
                origins
                    .iter()
                    .map(|(id, origin)| (*id, *origin + *offset))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn resize_preview(&self) -> Option<(NodeId, Vec2)> {
        match self.state {
            InteractionState::ResizingNode { node_id, size, .. } => Some((node_id, size)),
            _ => None,
        }
    }

    /// World-space rubber band.
    pub fn selection_rect(&self) -> Option<Rect> {
        match &self.state {
            InteractionState::RectSelecting { selection, .. } => Some(selection.rect()),
            _ => None,
        }
    }

    pub fn connection_preview(&self, canvas: &Canvas) -> Option<CubicBezier> {
        match self.state {
            InteractionState::Connecting {
                from,
                side,
                pointer_world,
                ..
            } => {
                let rect = canvas.graph().node(from)?.rect();
                Some(geometry::preview_curve(&rect, side, pointer_world))
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Pointer
    // ------------------------------------------------------------------

    pub fn handle_pointer(&mut self, canvas: &mut Canvas, event: PointerEvent) -> Response {
        match event.kind {
            PointerKind::Down => self.pointer_down(canvas, event),
            PointerKind::Move => self.pointer_move(canvas, event),
            PointerKind::Up => self.pointer_up(canvas, event),
            PointerKind::Cancel => self.cancel(),
        }
    }

    /// Wheel zooms about the cursor; negative `delta` zooms in.
    pub fn handle_wheel(&mut self, canvas: &mut Canvas, screen: Vec2, delta: f32) -> Response {
        if delta == 0.0 || !delta.is_finite() {
            return Response::Ignored;
        }
        let step = canvas.options().zoom_step;
        let factor = if delta < 0.0 { step } else { 1.0 / step };
        canvas.zoom_at(screen, factor);
        Response::Handled
    }

    fn pointer_down(&mut self, canvas: &mut Canvas, event: PointerEvent) -> Response {
        let world = canvas.screen_to_world(event.screen);
        let hit = HitTester::from_graph(canvas.graph(), canvas.transform().scale()).hit_test(world);

        if let InteractionState::Connecting { from, side, .. } = self.state {
            return self.finish_connection(canvas, from, side, hit);
        }
        if !self.is_idle() {
            return Response::Ignored;
        }

        match event.button {
            PointerButton::Middle => {
                self.state = InteractionState::Panning {
                    last_screen: event.screen,
                };
                Response::Handled
            }
            PointerButton::Secondary => Response::Ignored,
            PointerButton::Primary => match hit {
                HitResult::AnchorHandle { node_id, side } => {
                    self.state = InteractionState::Connecting {
                        from: node_id,
                        side,
                        pointer_world: world,
                        dragged: false,
                    };
                    Response::Handled
                }
                HitResult::ResizeHandle(node_id) => {
                    let Some(node) = canvas.graph().node(node_id) else {
                        return Response::Ignored;
                    };
                    self.state = InteractionState::ResizingNode {
                        node_id,
                        grab_world: world,
                        origin_size: node.size,
                        size: node.size,
                    };
                    Response::Handled
                }
                HitResult::Node(node_id) => {
                    self.begin_drag(canvas, node_id, world, event.modifiers.shift);
                    Response::Handled
                }
                HitResult::Background | HitResult::Connection(_) => {
                    if event.modifiers.alt {
                        self.state = InteractionState::Panning {
                            last_screen: event.screen,
                        };
                    } else {
                        let additive = event.modifiers.shift;
                        if !additive {
                            canvas.clear_selection();
                        }
                        self.state = InteractionState::RectSelecting {
                            selection: SelectionBox::begin(world),
                            additive,
                        };
                    }
                    Response::Handled
                }
            },
        }
    }

    fn begin_drag(&mut self, canvas: &mut Canvas, node_id: NodeId, world: Vec2, additive: bool) {
        if additive {
            canvas.add_to_selection(node_id);
        } else if !canvas.is_selected(node_id) {
            canvas.set_selection(&[node_id]);
        }
        let origins = canvas
            .selection()
            .iter()
            .filter_map(|id| canvas.graph().node(*id))
            .map(|node| (node.id, node.position))
            .collect();
        self.state = InteractionState::DraggingNode {
            grab_world: world,
            origins,
            offset: Vec2::ZERO,
        };
    }

    fn pointer_move(&mut self, canvas: &mut Canvas, event: PointerEvent) -> Response {
        let world = canvas.screen_to_world(event.screen);
        match &mut self.state {
            InteractionState::Idle => return Response::Ignored,
            InteractionState::Panning { last_screen } => {
                let delta = event.screen - *last_screen;
                *last_screen = event.screen;
                canvas.pan_by(delta);
            }
            InteractionState::RectSelecting { selection, .. } => {
                selection.end = world;
            }
            InteractionState::DraggingNode {
                grab_world, offset, ..
            } => {
                *offset = world - *grab_world;
            }
            InteractionState::ResizingNode {
                grab_world,
                origin_size,
                size,
                ..
            } => {
                *size = clamp_size(*origin_size + (world - *grab_world));
            }
            InteractionState::Connecting {
                pointer_world,
                dragged,
                ..
            } => {
                *pointer_world = world;
                *dragged = true;
            }
        }
        Response::Handled
    }

    fn pointer_up(&mut self, canvas: &mut Canvas, event: PointerEvent) -> Response {
        let world = canvas.screen_to_world(event.screen);
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        match state {
            InteractionState::Idle => Response::Ignored,
            InteractionState::Panning { .. } => Response::Handled,
            InteractionState::RectSelecting {
                mut selection,
                additive,
            } => {
                selection.end = world;
                let area = selection.rect();
                let tester = HitTester::from_graph(canvas.graph(), canvas.transform().scale());
                let mut ids = tester.nodes_in_rect(&area);
                if additive {
                    let mut combined = canvas.selected_ids();
                    combined.retain(|id| !ids.contains(id));
                    combined.append(&mut ids);
                    ids = combined;
                }
                canvas.set_selection(&ids);
                Response::Handled
            }
            InteractionState::DraggingNode {
                grab_world,
                origins,
                ..
            } => {
                let offset = world - grab_world;
                if offset != Vec2::ZERO {
                    let moves: Vec<(NodeId, Vec2)> = origins
                        .into_iter()
                        .map(|(id, origin)| (id, origin + offset))
                        .collect();
                    canvas.move_nodes(&moves);
                }
                Response::Handled
            }
            InteractionState::ResizingNode {
                node_id,
                grab_world,
                origin_size,
                ..
            } => {
                let size = clamp_size(origin_size + (world - grab_world));
                canvas.update_node(node_id, &NodePatch::size(size));
                Response::Handled
            }
            InteractionState::Connecting {
                from,
                side,
                dragged,
                ..
            } => {
                let hit = HitTester::from_graph(canvas.graph(), canvas.transform().scale())
                    .hit_test(world);
                let released_on_source = hit.node_id() == Some(from);
                if !dragged || released_on_source {
                    // Click-click mode: wait for the target click.
                    self.state = InteractionState::Connecting {
                        from,
                        side,
                        pointer_world: world,
                        dragged: false,
                    };
                    return Response::Handled;
                }
                self.finish_connection(canvas, from, side, hit)
            }
        }
    }

    fn finish_connection(
        &mut self,
        canvas: &mut Canvas,
        from: NodeId,
        side: AnchorSide,
        hit: HitResult,
    ) -> Response {
        self.state = InteractionState::Idle;
        let Some(target) = hit.node_id().filter(|id| *id != from) else {
            tracing::debug!("Connection from {} cancelled", from);
            return Response::Handled;
        };
        let target_side = match hit {
            HitResult::AnchorHandle { side, .. } => Some(side),
            _ => {
                let graph = canvas.graph();
                match (graph.node(target), graph.node(from)) {
                    (Some(to), Some(source)) => {
                        Some(geometry::smart_side(&to.rect(), &source.rect()))
                    }
                    _ => None,
                }
            }
        };
        canvas.connect(from, target, Some(side), target_side);
        Response::Handled
    }

    fn cancel(&mut self) -> Response {
        if self.is_idle() {
            return Response::Ignored;
        }
        self.state = InteractionState::Idle;
        Response::Handled
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    pub fn handle_key(&mut self, canvas: &mut Canvas, command: KeyCommand) -> Response {
        match command {
            KeyCommand::Cancel => {
                if self.is_idle() {
                    canvas.clear_selection();
                    return Response::Handled;
                }
                return self.cancel();
            }
            KeyCommand::ZoomIn => {
                canvas.zoom_in();
                return Response::Handled;
            }
            KeyCommand::ZoomOut => {
                canvas.zoom_out();
                return Response::Handled;
            }
            _ => {}
        }
        if !self.is_idle() {
            return Response::Ignored;
        }

        match command {
            KeyCommand::AddNode => {
                let id = canvas.add_node_at_center();
                canvas.set_selection(&[id]);
            }
            KeyCommand::AddGroup => canvas.request_group_dialog(),
            KeyCommand::DeleteSelection => {
                canvas.delete_selection();
            }
            KeyCommand::Duplicate => {
                canvas.duplicate_selection();
            }
            KeyCommand::Undo => {
                canvas.undo();
            }
            KeyCommand::Redo => {
                canvas.redo();
            }
            KeyCommand::GroupSelection => {
                canvas.group_selection(DEFAULT_GROUP_NAME);
            }
            KeyCommand::FitToScreen => canvas.fit_to_screen(),
            KeyCommand::AutoLayout => {
                let ids = canvas.selected_ids();
                if ids.len() < 2 {
                    canvas.events().publish(Event::Notify {
                        level: NotificationLevel::Info,
                        message: "Select at least two nodes to arrange".to_string(),
                    });
                    return Response::Ignored;
                }
                return Response::LayoutRequested(ids);
            }
            KeyCommand::Cancel | KeyCommand::ZoomIn | KeyCommand::ZoomOut => {}
        }
        Response::Handled
    }
}
