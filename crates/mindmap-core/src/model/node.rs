use serde::{Deserialize, Serialize};

use super::{DocumentId, NodeId};

/// Top-level container of one mind-map tree.
///
/// The root node is not cached here; it is always derived as the live node
/// of the document without a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub theme: String,
    pub visibility: String,
    pub metadata: Option<String>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// Input for creating a document together with its root node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDocument {
    pub title: String,
    pub theme: Option<String>,
    pub visibility: Option<String>,
}

impl NewDocument {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A live node as seen by readers.
///
/// `children_order` is derived from the children's stored ranks when the
/// node is loaded; it is never written back directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub document_id: DocumentId,
    pub parent_id: Option<NodeId>,
    pub content: String,
    pub children_order: Vec<NodeId>,
    pub depth: i64,
    pub collapsed: bool,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub metadata: Option<String>,
    pub position: Option<String>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Node {
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Field values for a node being created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFields {
    pub content: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub labels: Option<String>,
    pub metadata: Option<String>,
    pub position: Option<String>,
    pub collapsed: bool,
}

impl NodeFields {
    #[must_use]
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Partial update of non-structural node fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl NodePatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.color.is_none()
            && self.icon.is_none()
            && self.description.is_none()
            && self.labels.is_none()
            && self.metadata.is_none()
            && self.position.is_none()
    }

    /// Apply the set fields onto `node`.
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(content) = &self.content {
            node.content.clone_from(content);
        }
        if self.color.is_some() {
            node.color.clone_from(&self.color);
        }
        if self.icon.is_some() {
            node.icon.clone_from(&self.icon);
        }
        if self.description.is_some() {
            node.description.clone_from(&self.description);
        }
        if self.labels.is_some() {
            node.labels.clone_from(&self.labels);
        }
        if self.metadata.is_some() {
            node.metadata.clone_from(&self.metadata);
        }
        if self.position.is_some() {
            node.position.clone_from(&self.position);
        }
    }
}
