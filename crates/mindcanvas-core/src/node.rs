use crate::{GroupId, NodeId, Rect, Vec2};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Size floor for every node; smaller requests are clamped up to it.
pub const MIN_NODE_WIDTH: f32 = 200.0;
pub const MIN_NODE_HEIGHT: f32 = 120.0;

pub const DEFAULT_NODE_COLOR: &str = "#ffffff";

/// A link attached to a link card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// The typed payload of a node. Call sites match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeContent {
    Text { text: String },
    Image { images: Vec<String> },
    Link { links: Vec<LinkRef> },
    Video { videos: Vec<String> },
}

impl Default for NodeContent {
    fn default() -> Self {
        NodeContent::Text {
            text: String::new(),
        }
    }
}

impl NodeContent {
    pub fn kind_label(&self) -> &'static str {
        match self {
            NodeContent::Text { .. } => "text",
            NodeContent::Image { .. } => "image",
            NodeContent::Link { .. } => "link",
            NodeContent::Video { .. } => "video",
        }
    }

    /// Number of media references carried by the content (a text body counts as one).
    pub fn item_count(&self) -> usize {
        match self {
            NodeContent::Text { text } => usize::from(!text.is_empty()),
            NodeContent::Image { images } => images.len(),
            NodeContent::Link { links } => links.len(),
            NodeContent::Video { videos } => videos.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub position: Vec2,
    pub size: Vec2,
    pub content: NodeContent,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub color: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// A fresh text node at `position` with the minimum size.
    pub fn new(position: Vec2) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            position,
            size: Vec2::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT),
            content: NodeContent::default(),
            group_id: None,
            color: DEFAULT_NODE_COLOR.to_string(),
            tags: BTreeSet::new(),
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }

    pub fn center(&self) -> Vec2 {
        self.rect().center()
    }

    /// Merge `patch` into the node. Returns false when nothing changed, in which case
    /// `updated_at` is left alone.
    pub fn apply(&mut self, patch: &NodePatch, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(position) = patch.position
            && position.is_finite()
            && position != self.position
        {
            self.position = position;
            changed = true;
        }
        if let Some(size) = patch.size {
            let size = clamp_size(size);
            if size != self.size {
                self.size = size;
                changed = true;
            }
        }
        if let Some(content) = &patch.content
            && *content != self.content
        {
            self.content = content.clone();
            changed = true;
        }
        if let Some(color) = &patch.color
            && *color != self.color
        {
            self.color = color.clone();
            changed = true;
        }
        if let Some(tags) = &patch.tags
            && *tags != self.tags
        {
            self.tags = tags.clone();
            changed = true;
        }
        if let Some(comment) = &patch.comment
            && *comment != self.comment
        {
            self.comment = comment.clone();
            changed = true;
        }

        if changed {
            self.touch(now);
        }
        changed
    }

    /// Bump `updated_at`, never letting it fall behind `created_at`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }

    /// Repair what an outside source may leave inconsistent: the size floor and
    /// `updated_at >= created_at`.
    pub fn normalize(&mut self) {
        self.size = clamp_size(self.size);
        if self.updated_at < self.created_at {
            self.updated_at = self.created_at;
        }
    }
}

/// Clamp a requested size to the node floor. Non-finite components fall back to the floor.
pub fn clamp_size(size: Vec2) -> Vec2 {
    let w = if size.x.is_finite() {
        size.x.max(MIN_NODE_WIDTH)
    } else {
        MIN_NODE_WIDTH
    };
    let h = if size.y.is_finite() {
        size.y.max(MIN_NODE_HEIGHT)
    } else {
        MIN_NODE_HEIGHT
    };
    Vec2::new(w, h)
}

/// Partial update for a node. Group membership is changed through group operations only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePatch {
    pub position: Option<Vec2>,
    pub size: Option<Vec2>,
    pub content: Option<NodeContent>,
    pub color: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    /// `Some(None)` clears the comment.
    pub comment: Option<Option<String>>,
}

impl NodePatch {
    pub fn position(position: Vec2) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn size(size: Vec2) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    pub fn content(content: NodeContent) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.size.is_none()
            && self.content.is_none()
            && self.color.is_none()
            && self.tags.is_none()
            && self.comment.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_node_has_floor_size_and_text_content() {
        let node = Node::new(Vec2::new(10.0, 20.0));
        assert_eq!(node.size, Vec2::new(MIN_NODE_WIDTH, MIN_NODE_HEIGHT));
        assert_eq!(node.content.kind_label(), "text");
        assert_eq!(node.created_at, node.updated_at);
    }

    #[test]
    fn test_apply_clamps_size_and_bumps_timestamp() {
        let mut node = Node::new(Vec2::ZERO);
        let later = node.created_at + Duration::seconds(5);

        let changed = node.apply(&NodePatch::size(Vec2::new(10.0, 500.0)), later);

        assert!(changed);
        assert_eq!(node.size, Vec2::new(MIN_NODE_WIDTH, 500.0));
        assert_eq!(node.updated_at, later);
    }

    #[test]
    fn test_apply_noop_keeps_timestamp() {
        let mut node = Node::new(Vec2::ZERO);
        let before = node.updated_at;
        let changed = node.apply(
            &NodePatch::position(Vec2::ZERO),
            before + Duration::seconds(1),
        );
        assert!(!changed);
        assert_eq!(node.updated_at, before);
    }

    #[test]
    fn test_touch_never_precedes_creation() {
        let mut node = Node::new(Vec2::ZERO);
        node.touch(node.created_at - Duration::hours(1));
        assert!(node.updated_at >= node.created_at);
    }

    #[test]
    fn test_content_serializes_with_type_tag() {
        let content = NodeContent::Link {
            links: vec![LinkRef {
                url: "https://example.com".to_string(),
                title: "Example".to_string(),
            }],
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "link");
        assert_eq!(json["links"][0]["url"], "https://example.com");
    }
}
