use crate::geometry::{CubicBezier, anchor_point, route_connection};
use crate::store::CanvasGraph;
use mindcanvas_core::{AnchorSide, ConnectionId, NodeId, Rect, Vec2};

/// Half-size of an anchor or resize control, in screen pixels.
pub const HANDLE_SCREEN_RADIUS: f32 = 8.0;
/// Distance from a connection curve that still counts as a hit, in screen pixels.
pub const EDGE_SCREEN_TOLERANCE: f32 = 6.0;

/// Result of a hit test at a world position.
///
/// Priority order: AnchorHandle / ResizeHandle > Node > Connection > Background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    Background,
    /// The connect control on one side of a node.
    AnchorHandle { node_id: NodeId, side: AnchorSide },
    /// The bottom-right resize control of a node.
    ResizeHandle(NodeId),
    Node(NodeId),
    Connection(ConnectionId),
}

impl HitResult {
    /// The node this hit belongs to, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match *self {
            Self::AnchorHandle { node_id, .. }
            | Self::ResizeHandle(node_id)
            | Self::Node(node_id) => Some(node_id),
            Self::Background | Self::Connection(_) => None,
        }
    }
}

/// Spatial snapshot of the canvas for pointer hit testing.
///
/// Control sizes are given in screen pixels and converted to world units with the zoom
/// at build time, so handles keep the same on-screen size at every scale.
#[derive(Debug, Clone)]
pub struct HitTester {
    /// Node rectangles in z-order; the last entry is drawn on top.
    node_rects: Vec<(NodeId, Rect)>,
    connection_curves: Vec<(ConnectionId, CubicBezier)>,
    handle_radius: f32,
    edge_tolerance: f32,
    bezier_samples: usize,
}

impl HitTester {
    pub fn from_graph(graph: &CanvasGraph, zoom: f32) -> Self {
        let node_rects = graph.nodes().map(|n| (n.id, n.rect())).collect();
        let connection_curves = graph
            .connections()
            .filter_map(|conn| {
                let from = graph.node(conn.from_node_id)?.rect();
                let to = graph.node(conn.to_node_id)?.rect();
                Some((
                    conn.id,
                    route_connection(&from, &to, conn.from_point, conn.to_point),
                ))
            })
            .collect();

        Self {
            connection_curves,
            ..Self::from_rects(node_rects, zoom)
        }
    }

    /// Build from bare rectangles (z-order preserved) with no connections.
    pub fn from_rects(node_rects: Vec<(NodeId, Rect)>, zoom: f32) -> Self {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        Self {
            node_rects,
            connection_curves: Vec::new(),
            handle_radius: HANDLE_SCREEN_RADIUS / zoom,
            edge_tolerance: EDGE_SCREEN_TOLERANCE / zoom,
            bezier_samples: 32,
        }
    }

    pub fn handle_radius(&self) -> f32 {
        self.handle_radius
    }

    pub fn hit_test(&self, pos: Vec2) -> HitResult {
        if let Some(control) = self.hit_test_control(pos) {
            return control;
        }
        if let Some(node_id) = self.hit_test_node(pos) {
            return HitResult::Node(node_id);
        }
        if let Some(conn_id) = self.hit_test_connection(pos) {
            return HitResult::Connection(conn_id);
        }
        HitResult::Background
    }

    /// Anchor and resize controls, topmost node first.
    pub fn hit_test_control(&self, pos: Vec2) -> Option<HitResult> {
        for &(node_id, rect) in self.node_rects.iter().rev() {
            for side in AnchorSide::ALL {
                if self.handle_contains(anchor_point(&rect, side), pos) {
                    return Some(HitResult::AnchorHandle { node_id, side });
                }
            }
            if self.handle_contains(rect.max, pos) {
                return Some(HitResult::ResizeHandle(node_id));
            }
        }
        None
    }

    /// Topmost node whose body contains `pos`.
    pub fn hit_test_node(&self, pos: Vec2) -> Option<NodeId> {
        self.node_rects
            .iter()
            .rev()
            .find(|(_, rect)| rect.contains(pos))
            .map(|(id, _)| *id)
    }

    /// Closest connection within tolerance.
    pub fn hit_test_connection(&self, pos: Vec2) -> Option<ConnectionId> {
        let mut best_id = None;
        let mut best_dist = self.edge_tolerance;

        for (conn_id, curve) in &self.connection_curves {
            if !curve.hull().expand(self.edge_tolerance).contains(pos) {
                continue;
            }
            let dist = curve.point_distance(pos, self.bezier_samples);
            if dist < best_dist {
                best_dist = dist;
                best_id = Some(*conn_id);
            }
        }

        best_id
    }

    /// Nodes whose rectangle overlaps `area` on both axes by a positive amount.
    pub fn nodes_in_rect(&self, area: &Rect) -> Vec<NodeId> {
        self.node_rects
            .iter()
            .filter(|(_, rect)| rect.overlaps(area))
            .map(|(id, _)| *id)
            .collect()
    }

    fn handle_contains(&self, center: Vec2, pos: Vec2) -> bool {
        (pos.x - center.x).abs() <= self.handle_radius
            && (pos.y - center.y).abs() <= self.handle_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindcanvas_core::NodePatch;

    #[test]
    fn test_selection_rectangle_uses_intersection() {
        let r1 = NodeId::new();
        let r2 = NodeId::new();
        let tester = HitTester::from_rects(
            vec![
                (r1, Rect::from_pos_size(Vec2::new(0.0, 0.0), Vec2::new(100.0, 50.0))),
                (r2, Rect::from_pos_size(Vec2::new(200.0, 200.0), Vec2::new(50.0, 50.0))),
            ],
            1.0,
        );
        let area = Rect::from_points(Vec2::new(150.0, 150.0), Vec2::new(0.0, 0.0));
        assert_eq!(tester.nodes_in_rect(&area), vec![r1]);
    }

    #[test]
    fn test_touching_edge_is_not_selected() {
        let mut graph = CanvasGraph::new();
        let id = graph.create_node(Vec2::new(100.0, 0.0));
        let tester = HitTester::from_graph(&graph, 1.0);
        let area = Rect::from_points(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        assert!(tester.nodes_in_rect(&area).is_empty());
        let area = Rect::from_points(Vec2::new(0.0, 0.0), Vec2::new(101.0, 100.0));
        assert_eq!(tester.nodes_in_rect(&area), vec![id]);
    }

    #[test]
    fn test_priority_anchor_over_body_over_connection() {
        let mut graph = CanvasGraph::new();
        let a = graph.create_node(Vec2::new(0.0, 0.0));
        let b = graph.create_node(Vec2::new(600.0, 0.0));
        let conn = graph
            .create_connection(a, b, Some(AnchorSide::Right), Some(AnchorSide::Left))
            .unwrap();
        let tester = HitTester::from_graph(&graph, 1.0);

        assert_eq!(
            tester.hit_test(Vec2::new(200.0, 60.0)),
            HitResult::AnchorHandle {
                node_id: a,
                side: AnchorSide::Right
            }
        );
        assert_eq!(tester.hit_test(Vec2::new(200.0, 120.0)), HitResult::ResizeHandle(a));
        assert_eq!(tester.hit_test(Vec2::new(50.0, 50.0)), HitResult::Node(a));
        assert_eq!(tester.hit_test(Vec2::new(400.0, 60.0)), HitResult::Connection(conn));
        assert_eq!(tester.hit_test(Vec2::new(400.0, 500.0)), HitResult::Background);
    }

    #[test]
    fn test_topmost_node_wins() {
        let mut graph = CanvasGraph::new();
        let below = graph.create_node(Vec2::new(0.0, 0.0));
        let above = graph.create_node(Vec2::new(50.0, 50.0));
        let tester = HitTester::from_graph(&graph, 1.0);

        assert_eq!(tester.hit_test(Vec2::new(100.0, 100.0)), HitResult::Node(above));
        assert_eq!(tester.hit_test(Vec2::new(20.0, 20.0)), HitResult::Node(below));
    }

    #[test]
    fn test_handle_radius_scales_with_zoom() {
        let mut graph = CanvasGraph::new();
        let id = graph.create_node(Vec2::ZERO);
        graph.update_node(id, &NodePatch::size(Vec2::new(400.0, 200.0)));

        let zoomed_in = HitTester::from_graph(&graph, 2.0);
        let zoomed_out = HitTester::from_graph(&graph, 0.5);
        let near_right_anchor = Vec2::new(400.0 - 10.0, 100.0);

        assert_eq!(zoomed_in.handle_radius(), 4.0);
        assert_eq!(zoomed_in.hit_test(near_right_anchor), HitResult::Node(id));
        assert_eq!(
            zoomed_out.hit_test(near_right_anchor),
            HitResult::AnchorHandle {
                node_id: id,
                side: AnchorSide::Right
            }
        );
    }
}
