//! Structural comparison of two trees of the same document.
//!
//! Both sides are flattened into id-keyed maps and classified per node:
//!
//! - only in "to": added
//! - only in "from": removed
//! - parent changed: moved, with breadcrumb paths on both sides
//! - content changed: updated (`content`)
//! - color or icon changed: updated (`style`), independent of the above
//!
//! Records come out ordered by node id. A snapshot that does not parse is an
//! error, never an empty diff.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db::versions;
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, NodeId, VersionId};
use crate::version::snapshot::{self, FlatNode, Snapshot};

const PATH_SEPARATOR: &str = " > ";

/// Which aspect of a node an update record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Content,
    Style,
}

/// An added, removed or updated node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffNode {
    pub node_id: NodeId,
    pub parent_id: Option<NodeId>,
    pub content: String,
    pub depth: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<ChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl DiffNode {
    fn of(node_id: NodeId, node: &FlatNode) -> Self {
        Self {
            node_id,
            parent_id: node.parent_id,
            content: node.content.clone(),
            depth: node.depth,
            change_type: None,
            old_value: None,
            new_value: None,
        }
    }

    fn change(mut self, change_type: ChangeType, old_value: String, new_value: String) -> Self {
        self.change_type = Some(change_type);
        self.old_value = Some(old_value);
        self.new_value = Some(new_value);
        self
    }
}

/// A node whose parent differs between the two sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedNode {
    pub node_id: NodeId,
    pub content: String,
    pub old_parent_id: Option<NodeId>,
    pub new_parent_id: Option<NodeId>,
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
    pub moved: usize,
}

impl DiffStats {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0 && self.moved == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub document_id: DocumentId,
    pub from_version_id: VersionId,
    /// `None` when the "to" side is the live tree.
    pub to_version_id: Option<VersionId>,
    pub added_nodes: Vec<DiffNode>,
    pub removed_nodes: Vec<DiffNode>,
    pub updated_nodes: Vec<DiffNode>,
    pub moved_nodes: Vec<MovedNode>,
    pub stats: DiffStats,
}

/// Diff operations over one connection.
pub struct DiffEngine<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> DiffEngine<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    /// Compare two stored versions of one document.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for a missing version,
    /// [`MindmapError::InvalidReference`] when the versions belong to
    /// different documents, and [`MindmapError::Serialization`] for an
    /// unparsable snapshot.
    pub fn compare_versions(&self, from_id: VersionId, to_id: VersionId) -> Result<VersionDiff> {
        let from = versions::require(self.conn, from_id)?;
        let to = versions::require(self.conn, to_id)?;
        if from.document_id != to.document_id {
            return Err(MindmapError::InvalidReference(format!(
                "version {from_id} belongs to document {} but version {to_id} to document {}",
                from.document_id, to.document_id
            )));
        }
        let from_snapshot = Snapshot::parse(&from.snapshot_data, self.config)?;
        let to_snapshot = Snapshot::parse(&to.snapshot_data, self.config)?;
        let diff = self.diff(
            from.document_id,
            from_id,
            Some(to_id),
            &from_snapshot,
            &to_snapshot,
        )?;
        tracing::info!(
            document_id = %from.document_id,
            from = from.version_number,
            to = to.version_number,
            added = diff.stats.added,
            removed = diff.stats.removed,
            updated = diff.stats.updated,
            moved = diff.stats.moved,
            "compared versions"
        );
        Ok(diff)
    }

    /// Compare a stored version ("from") with the live tree ("to").
    ///
    /// # Errors
    ///
    /// As [`Self::compare_versions`], plus [`MindmapError::InvalidReference`]
    /// when the version belongs to another document.
    pub fn compare_with_current(
        &self,
        document_id: DocumentId,
        version_id: VersionId,
    ) -> Result<VersionDiff> {
        let version = versions::require(self.conn, version_id)?;
        if version.document_id != document_id {
            return Err(MindmapError::InvalidReference(format!(
                "version {version_id} belongs to document {}, not {document_id}",
                version.document_id
            )));
        }
        let from_snapshot = Snapshot::parse(&version.snapshot_data, self.config)?;
        let current = snapshot::capture(self.conn, document_id)?;
        let diff = self.diff(document_id, version_id, None, &from_snapshot, &current)?;
        tracing::info!(
            document_id = %document_id,
            from = version.version_number,
            changes = diff.stats.added + diff.stats.removed + diff.stats.updated + diff.stats.moved,
            "compared version with live tree"
        );
        Ok(diff)
    }

    fn diff(
        &self,
        document_id: DocumentId,
        from_version_id: VersionId,
        to_version_id: Option<VersionId>,
        from: &Snapshot,
        to: &Snapshot,
    ) -> Result<VersionDiff> {
        let from_nodes = from.flatten()?;
        let to_nodes = to.flatten()?;
        let max_hops = self.config.tree.max_ancestor_hops;

        let mut added_nodes = Vec::new();
        let mut updated_nodes = Vec::new();
        let mut moved_nodes = Vec::new();

        for (&id, to_node) in &to_nodes {
            let Some(from_node) = from_nodes.get(&id) else {
                added_nodes.push(DiffNode::of(id, to_node));
                continue;
            };
            if from_node.parent_id != to_node.parent_id {
                moved_nodes.push(MovedNode {
                    node_id: id,
                    content: to_node.content.clone(),
                    old_parent_id: from_node.parent_id,
                    new_parent_id: to_node.parent_id,
                    old_path: breadcrumb(&from_nodes, id, max_hops)?,
                    new_path: breadcrumb(&to_nodes, id, max_hops)?,
                });
            }
            if from_node.content != to_node.content {
                updated_nodes.push(DiffNode::of(id, to_node).change(
                    ChangeType::Content,
                    from_node.content.clone(),
                    to_node.content.clone(),
                ));
            }
            if from_node.color != to_node.color || from_node.icon != to_node.icon {
                updated_nodes.push(DiffNode::of(id, to_node).change(
                    ChangeType::Style,
                    style_of(from_node),
                    style_of(to_node),
                ));
            }
        }

        let removed_nodes: Vec<DiffNode> = from_nodes
            .iter()
            .filter(|(id, _)| !to_nodes.contains_key(id))
            .map(|(&id, node)| DiffNode::of(id, node))
            .collect();

        let stats = DiffStats {
            added: added_nodes.len(),
            removed: removed_nodes.len(),
            updated: updated_nodes.len(),
            moved: moved_nodes.len(),
        };
        Ok(VersionDiff {
            document_id,
            from_version_id,
            to_version_id,
            added_nodes,
            removed_nodes,
            updated_nodes,
            moved_nodes,
            stats,
        })
    }
}

fn style_of(node: &FlatNode) -> String {
    json!({ "color": node.color, "icon": node.icon }).to_string()
}

/// Contents from the root down to `id`, joined with `" > "`.
fn breadcrumb(nodes: &BTreeMap<NodeId, FlatNode>, id: NodeId, max_hops: usize) -> Result<String> {
    let mut parts = Vec::new();
    let mut current = Some(id);
    while let Some(node_id) = current {
        let Some(node) = nodes.get(&node_id) else {
            break;
        };
        if parts.len() > max_hops {
            return Err(MindmapError::DataIntegrity(format!(
                "path of node {id} exceeds {max_hops} hops"
            )));
        }
        parts.push(node.content.as_str());
        current = node.parent_id;
    }
    parts.reverse();
    Ok(parts.join(PATH_SEPARATOR))
}
