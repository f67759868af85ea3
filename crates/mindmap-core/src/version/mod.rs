//! Point-in-time snapshots, autosave retention and destructive restore.
//!
//! Version numbers are allocated by the inserting statement under an
//! IMMEDIATE transaction, so concurrent writers get distinct, increasing
//! numbers. Versions are never edited after creation; deletion is logical.

pub mod snapshot;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::chunk::ChunkCache;
use crate::config::Config;
use crate::db::nodes::{self, Placement};
use crate::db::versions::{self, NewVersion};
use crate::db::{self, documents};
use crate::error::{MindmapError, Result};
use crate::model::{
    DocumentId, NewOperation, NodeFields, NodeId, OpType, Version, VersionId, VersionType, now_us,
};
use crate::oplog::{self, generate_op_id};

pub use snapshot::{Snapshot, SnapshotNode};

/// Optional metadata for [`VersionManager::create_version`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionOptions {
    /// Defaults to "Version N" (explicit) or "Autosave N".
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<i64>,
}

/// What a restore did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub document_id: DocumentId,
    pub restored_from: VersionId,
    /// Explicit version holding the pre-restore tree, when one was taken.
    pub backup: Option<VersionId>,
    pub root_id: Option<NodeId>,
    pub node_count: usize,
    /// Snapshot node id to the freshly minted live node id.
    pub id_map: BTreeMap<NodeId, NodeId>,
}

/// Version operations over one connection.
pub struct VersionManager<'a> {
    conn: &'a Connection,
    cache: &'a ChunkCache,
    config: &'a Config,
}

impl<'a> VersionManager<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, cache: &'a ChunkCache, config: &'a Config) -> Self {
        Self {
            conn,
            cache,
            config,
        }
    }

    /// Snapshot the live tree of a document.
    ///
    /// Autosaves also prune older autosaves down to `autosave_keep`.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for a missing document,
    /// [`MindmapError::DataIntegrity`] if the live tree is malformed, or a
    /// database error.
    pub fn create_version(
        &self,
        document_id: DocumentId,
        version_type: VersionType,
        options: &VersionOptions,
    ) -> Result<Version> {
        let tx = db::immediate(self.conn)?;
        let id = self.insert_snapshot(&tx, document_id, version_type, options)?;
        tx.commit()?;
        versions::require(self.conn, id)
    }

    /// Take an autosave on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_version`].
    pub fn auto_save(&self, document_id: DocumentId, user_id: i64) -> Result<Version> {
        self.create_version(
            document_id,
            VersionType::Autosave,
            &VersionOptions {
                created_by: Some(user_id),
                ..VersionOptions::default()
            },
        )
    }

    /// Live versions of a document, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_versions(
        &self,
        document_id: DocumentId,
        version_type: Option<VersionType>,
    ) -> Result<Vec<Version>> {
        versions::list(self.conn, document_id, version_type)
    }

    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the version is missing or deleted.
    pub fn get_version(&self, version_id: VersionId) -> Result<Version> {
        versions::require(self.conn, version_id)
    }

    /// Logically delete a version.
    ///
    /// # Errors
    ///
    /// [`MindmapError::InvalidOperation`] when the version holds the
    /// document's highest live number; [`MindmapError::NotFound`] if it is
    /// missing.
    pub fn delete_version(&self, version_id: VersionId) -> Result<()> {
        let tx = db::immediate(self.conn)?;
        let version = versions::require(&tx, version_id)?;
        if versions::max_live_number(&tx, version.document_id)? == Some(version.version_number) {
            return Err(MindmapError::InvalidOperation(format!(
                "version {} is the latest version of document {}",
                version.version_number, version.document_id
            )));
        }
        versions::soft_delete(&tx, version_id)?;
        tx.commit()?;
        tracing::info!(
            document_id = %version.document_id,
            version_number = version.version_number,
            "deleted version"
        );
        Ok(())
    }

    /// Replace the live tree of a document with the tree stored in a
    /// version. Node ids are freshly minted; the old nodes are logically
    /// deleted. With `create_backup` the current tree is first saved as an
    /// explicit version.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for a missing version or document and
    /// [`MindmapError::Serialization`] for an unparsable snapshot. Nothing is
    /// changed on error.
    pub fn restore_version(
        &self,
        version_id: VersionId,
        user_id: i64,
        create_backup: bool,
    ) -> Result<RestoreOutcome> {
        let tx = db::immediate(self.conn)?;
        let version = versions::require(&tx, version_id)?;
        let document_id = version.document_id;
        let mut doc = documents::require(&tx, document_id)?;
        let snapshot = Snapshot::parse(&version.snapshot_data, self.config)?;

        let backup = if create_backup {
            let options = VersionOptions {
                name: Some(format!("Backup before restoring {}", version.name)),
                description: Some(format!(
                    "Automatic backup taken before restoring version {}",
                    version.version_number
                )),
                created_by: Some(user_id),
            };
            Some(self.insert_snapshot(&tx, document_id, VersionType::Explicit, &options)?)
        } else {
            None
        };

        let now = now_us();
        let cleared = nodes::mark_document_deleted(&tx, document_id, now)?;
        let id_map = rebuild(&tx, document_id, snapshot.nodes.as_ref(), now)?;
        let root_id = snapshot.nodes.as_ref().and_then(|root| id_map.get(&root.id).copied());

        doc.title.clone_from(&snapshot.document.title);
        doc.theme.clone_from(&snapshot.document.theme);
        doc.updated_at_us = now;
        documents::save(&tx, &doc)?;

        let payload = json!({
            "versionId": version_id,
            "versionNumber": version.version_number,
            "backupVersionId": backup,
            "nodeCount": id_map.len(),
        });
        oplog::append(
            &tx,
            &NewOperation {
                op_id: generate_op_id(document_id, OpType::Restore, root_id, &payload),
                document_id,
                op_type: OpType::Restore,
                node_id: root_id,
                payload,
                user_id,
                causality_ts: None,
            },
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %document_id,
            version_number = version.version_number,
            cleared,
            restored = id_map.len(),
            backup = ?backup,
            "restored version"
        );
        self.cache.clear_cache(document_id);

        Ok(RestoreOutcome {
            document_id,
            restored_from: version_id,
            backup,
            root_id,
            node_count: id_map.len(),
            id_map,
        })
    }

    /// Capture and store a snapshot on an open transaction.
    fn insert_snapshot(
        &self,
        conn: &Connection,
        document_id: DocumentId,
        version_type: VersionType,
        options: &VersionOptions,
    ) -> Result<VersionId> {
        let snapshot = snapshot::capture(conn, document_id)?;
        let data = snapshot.to_json()?;
        let id = versions::insert_next(
            conn,
            &NewVersion {
                document_id,
                version_type,
                name: options.name.as_deref(),
                description: options.description.as_deref(),
                snapshot_data: &data,
                node_count: snapshot.node_count,
                created_by: options.created_by,
            },
            now_us(),
        )?;
        tracing::info!(
            document_id = %document_id,
            version_type = %version_type,
            nodes = snapshot.node_count,
            bytes = data.len(),
            "created version"
        );

        if version_type == VersionType::Autosave {
            let keep = self.config.versions.autosave_keep;
            let pruned = versions::prune_autosaves(conn, document_id, keep)?;
            if pruned > 0 {
                tracing::info!(document_id = %document_id, pruned, "pruned autosaves");
            }
        }
        Ok(id)
    }
}

/// Insert the snapshot tree as fresh live nodes, depth and ranks derived
/// from the tree shape rather than the stored values.
fn rebuild(
    conn: &Connection,
    document_id: DocumentId,
    root: Option<&SnapshotNode>,
    now: i64,
) -> Result<BTreeMap<NodeId, NodeId>> {
    let mut id_map = BTreeMap::new();
    let mut stack: Vec<(&SnapshotNode, Option<NodeId>, i64, i64)> =
        root.into_iter().map(|r| (r, None, 0, 0)).collect();

    while let Some((snap, parent_id, rank, depth)) = stack.pop() {
        let fields = NodeFields {
            content: snap.content.clone(),
            color: snap.color.clone(),
            icon: snap.icon.clone(),
            description: snap.description.clone(),
            labels: snap.labels.clone(),
            metadata: None,
            position: snap.position.clone(),
            collapsed: snap.collapsed,
        };
        let placement = Placement {
            document_id,
            parent_id,
            rank,
            depth,
        };
        let new_id = nodes::insert(conn, placement, &fields, now)?;
        if id_map.insert(snap.id, new_id).is_some() {
            return Err(MindmapError::DataIntegrity(format!(
                "snapshot lists node {} twice",
                snap.id
            )));
        }
        for (child_rank, child) in snap.children.iter().enumerate().rev() {
            stack.push((child, Some(new_id), db::sql_count(child_rank), depth + 1));
        }
    }
    Ok(id_map)
}
