use crate::{Rect, Vec2};
use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 3.0;

/// Viewport pan/zoom: `screen = world * scale + translation`.
///
/// The scale is clamped to `[MIN_SCALE, MAX_SCALE]` by every constructor and setter,
/// including deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    translation: Vec2,
    scale: f32,
}

#[derive(Serialize, Deserialize)]
struct TransformRepr {
    x: f32,
    y: f32,
    scale: f32,
}

impl From<TransformRepr> for Transform {
    fn from(repr: TransformRepr) -> Self {
        Transform::new(Vec2::new(repr.x, repr.y), repr.scale)
    }
}

impl From<Transform> for TransformRepr {
    fn from(t: Transform) -> Self {
        TransformRepr {
            x: t.translation.x,
            y: t.translation.y,
            scale: t.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        scale: 1.0,
    };

    pub fn new(translation: Vec2, scale: f32) -> Self {
        let translation = if translation.is_finite() {
            translation
        } else {
            Vec2::ZERO
        };
        Self {
            translation,
            scale: clamp_scale(scale),
        }
    }

    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_translation(&mut self, translation: Vec2) {
        if translation.is_finite() {
            self.translation = translation;
        }
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = clamp_scale(scale);
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.set_translation(self.translation + delta);
    }
}

pub fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}

/// Transient drag-select rectangle in world coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionBox {
    pub start: Vec2,
    pub end: Vec2,
    pub active: bool,
}

impl SelectionBox {
    pub fn begin(at: Vec2) -> Self {
        Self {
            start: at,
            end: at,
            active: true,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_is_clamped_everywhere() {
        assert_eq!(Transform::new(Vec2::ZERO, 10.0).scale(), MAX_SCALE);
        assert_eq!(Transform::new(Vec2::ZERO, 0.0).scale(), MIN_SCALE);

        let mut t = Transform::default();
        t.set_scale(f32::NAN);
        assert_eq!(t.scale(), 1.0);

        let parsed: Transform = serde_json::from_str(r#"{"x":5,"y":6,"scale":99}"#).unwrap();
        assert_eq!(parsed.scale(), MAX_SCALE);
        assert_eq!(parsed.translation(), Vec2::new(5.0, 6.0));
    }
}
