//! Pure geometry: screen/world mapping, zoom about a point, fit-to-bounds, anchor
//! resolution and bezier routing for connections.

use mindcanvas_core::{AnchorSide, Node, Rect, Transform, Vec2, clamp_scale};

/// Control-point offset as a fraction of the anchor distance.
pub const CONTROL_FACTOR: f32 = 0.5;
/// Upper bound on the control-point offset so long connections do not swing wide.
pub const MAX_CONTROL_LEN: f32 = 150.0;
/// Multiplicative step used by zoom in / zoom out commands.
pub const ZOOM_STEP: f32 = 1.2;

pub fn screen_to_world(screen: Vec2, transform: &Transform) -> Vec2 {
    (screen - transform.translation()) / transform.scale()
}

pub fn world_to_screen(world: Vec2, transform: &Transform) -> Vec2 {
    world * transform.scale() + transform.translation()
}

/// Scale by `factor` while keeping the world point under `screen` fixed.
pub fn zoom_at_point(transform: &Transform, screen: Vec2, factor: f32) -> Transform {
    if !factor.is_finite() || factor <= 0.0 {
        return *transform;
    }
    let anchor = screen_to_world(screen, transform);
    let scale = clamp_scale(transform.scale() * factor);
    Transform::new(screen - anchor * scale, scale)
}

/// Zoom about the centre of a viewport of size `viewport`.
pub fn zoom_about_center(transform: &Transform, viewport: Vec2, factor: f32) -> Transform {
    zoom_at_point(transform, viewport * 0.5, factor)
}

/// Bounding box of the given node rectangles.
pub fn nodes_bounds<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Option<Rect> {
    nodes
        .into_iter()
        .map(Node::rect)
        .reduce(|acc, rect| acc.union(&rect))
}

/// Transform that centres every node in the viewport, padded by `padding` world units,
/// zooming in no further than `max_zoom`. An empty set yields the identity transform.
pub fn fit_to_bounds<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
    viewport: Vec2,
    padding: f32,
    max_zoom: f32,
) -> Transform {
    let Some(bounds) = nodes_bounds(nodes) else {
        return Transform::IDENTITY;
    };
    let padded = bounds.expand(padding.max(0.0));
    let width = padded.width().max(f32::EPSILON);
    let height = padded.height().max(f32::EPSILON);

    let scale = clamp_scale((viewport.x / width).min(viewport.y / height).min(max_zoom));
    let translation = viewport * 0.5 - padded.center() * scale;
    Transform::new(translation, scale)
}

/// Midpoint of `side` on `rect`.
pub fn anchor_point(rect: &Rect, side: AnchorSide) -> Vec2 {
    let center = rect.center();
    match side {
        AnchorSide::Top => Vec2::new(center.x, rect.min.y),
        AnchorSide::Right => Vec2::new(rect.max.x, center.y),
        AnchorSide::Bottom => Vec2::new(center.x, rect.max.y),
        AnchorSide::Left => Vec2::new(rect.min.x, center.y),
    }
}

/// Side of `from` that faces `to`, chosen from the angle between the two centres
/// (y grows downwards).
pub fn smart_side(from: &Rect, to: &Rect) -> AnchorSide {
    let delta = to.center() - from.center();
    let angle = delta.y.atan2(delta.x).to_degrees();
    if (-45.0..=45.0).contains(&angle) {
        AnchorSide::Right
    } else if angle > 45.0 && angle < 135.0 {
        AnchorSide::Bottom
    } else if angle < -45.0 && angle > -135.0 {
        AnchorSide::Top
    } else {
        AnchorSide::Left
    }
}

/// Anchor position and side for one end of a connection: the stored side when present,
/// otherwise the side facing the other node.
pub fn resolve_anchor(rect: &Rect, side: Option<AnchorSide>, other: &Rect) -> (Vec2, AnchorSide) {
    let side = side.unwrap_or_else(|| smart_side(rect, other));
    (anchor_point(rect, side), side)
}

/// Control points for a connection curve. Each one is pushed outward along its anchor's
/// side by `min(distance * CONTROL_FACTOR, MAX_CONTROL_LEN)`.
pub fn bezier_control_points(
    from: Vec2,
    to: Vec2,
    from_side: AnchorSide,
    to_side: AnchorSide,
) -> (Vec2, Vec2) {
    let mut offset = (from.distance(to) * CONTROL_FACTOR).min(MAX_CONTROL_LEN);
    if !offset.is_finite() {
        offset = MAX_CONTROL_LEN;
    }
    (
        from + from_side.direction_vector() * offset,
        to + to_side.direction_vector() * offset,
    )
}

/// A cubic bezier curve segment defined by four control points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    pub start: Vec2,
    pub control1: Vec2,
    pub control2: Vec2,
    pub end: Vec2,
}

impl CubicBezier {
    /// Sample the curve at parameter t [0, 1]
    pub fn sample(&self, t: f32) -> Vec2 {
        let t2 = t * t;
        let t3 = t2 * t;
        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        self.start * mt3
            + self.control1 * (3.0 * mt2 * t)
            + self.control2 * (3.0 * mt * t2)
            + self.end * t3
    }

    /// Minimum distance from `point` to the curve, by uniform sampling.
    pub fn point_distance(&self, point: Vec2, num_samples: usize) -> f32 {
        let samples = num_samples.max(2);
        (0..=samples)
            .map(|i| self.sample(i as f32 / samples as f32).distance(point))
            .fold(f32::INFINITY, f32::min)
    }

    /// Bounding box of the control polygon; always contains the curve.
    pub fn hull(&self) -> Rect {
        Rect::from_points(self.start, self.end)
            .union(&Rect::from_points(self.control1, self.control2))
    }
}

/// Route a connection between two node rectangles, honouring stored anchors.
pub fn route_connection(
    from: &Rect,
    to: &Rect,
    from_point: Option<AnchorSide>,
    to_point: Option<AnchorSide>,
) -> CubicBezier {
    let (start, start_side) = resolve_anchor(from, from_point, to);
    let (end, end_side) = resolve_anchor(to, to_point, from);
    let (control1, control2) = bezier_control_points(start, end, start_side, end_side);
    CubicBezier {
        start,
        control1,
        control2,
        end,
    }
}

/// Curve for a connection still being drawn: from a node anchor to a free point.
pub fn preview_curve(from: &Rect, from_side: AnchorSide, pointer: Vec2) -> CubicBezier {
    let start = anchor_point(from, from_side);
    let delta = pointer - start;
    // The loose end points back toward the source along the dominant axis.
    let end_side = if delta.x.abs() >= delta.y.abs() {
        if delta.x >= 0.0 {
            AnchorSide::Left
        } else {
            AnchorSide::Right
        }
    } else if delta.y >= 0.0 {
        AnchorSide::Top
    } else {
        AnchorSide::Bottom
    };
    let (control1, control2) = bezier_control_points(start, pointer, from_side, end_side);
    CubicBezier {
        start,
        control1,
        control2,
        end: pointer,
    }
}
