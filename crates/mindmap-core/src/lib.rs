//! mindmap-core: versioned, chunk-loadable mind-map trees on SQLite.
//!
//! [`MindMap`] owns one connection plus the shared chunk cache and hands out
//! the components that do the work:
//!
//! - [`tree::TreeMutator`] for structural and field edits
//! - [`oplog::OperationLog`] for the idempotent edit log
//! - [`chunk::ChunkLoader`] for bounded, cached subtree reads
//! - [`version::VersionManager`] for snapshots and restore
//! - [`diff::DiffEngine`] for structural comparisons
//!
//! # Conventions
//!
//! - **Errors**: library calls return [`error::Result`]; every error carries
//!   a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros with structured fields; the embedding
//!   binary installs the subscriber.
//! - **Threads**: one `MindMap` per thread, sharing a cache through
//!   [`MindMap::with_cache`].

pub mod chunk;
pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod model;
pub mod oplog;
pub mod tree;
pub mod version;

use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{ChunkCache, ChunkLoader};
use crate::config::Config;
use crate::db::nodes::{self, Placement};
use crate::db::{documents, operations};
use crate::diff::DiffEngine;
use crate::error::{MindmapError, Result};
use crate::model::{
    Document, DocumentId, NewDocument, NewOperation, Node, NodeFields, OpType, now_us,
};
use crate::oplog::OperationLog;
use crate::tree::{EditContext, TreeMutator};
use crate::version::VersionManager;

const DEFAULT_THEME: &str = "default";
const DEFAULT_VISIBILITY: &str = "private";

/// Entry point: one database connection, its config and a chunk cache.
pub struct MindMap {
    conn: Connection,
    cache: Arc<ChunkCache>,
    config: Config,
}

impl MindMap {
    /// Open (or create) the store at `path` with a private cache. Config is
    /// read from `mindmap.toml` next to the database when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is malformed or the store cannot be
    /// opened and migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let config = load_config_for(path)?;
        let cache = Arc::new(ChunkCache::new(config.chunks.ttl()));
        Self::open_with(path, config, cache)
    }

    /// Open another connection to `path` that shares `cache` with existing
    /// handles.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn with_cache(path: &Path, cache: Arc<ChunkCache>) -> Result<Self> {
        let config = load_config_for(path)?;
        Self::open_with(path, config, cache)
    }

    /// Open the store with explicit config and cache.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] for inconsistent limits, or an error
    /// if the store cannot be opened and migrated.
    pub fn open_with(path: &Path, config: Config, cache: Arc<ChunkCache>) -> Result<Self> {
        config.validate()?;
        let conn = db::open_store(path)?;
        Ok(Self {
            conn,
            cache,
            config,
        })
    }

    /// A private in-memory store with default config.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot create the database.
    pub fn in_memory() -> Result<Self> {
        let config = Config::default();
        let cache = Arc::new(ChunkCache::new(config.chunks.ttl()));
        Ok(Self {
            conn: db::open_in_memory()?,
            cache,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn tree(&self) -> TreeMutator<'_> {
        TreeMutator::new(&self.conn, &self.cache, &self.config)
    }

    #[must_use]
    pub const fn oplog(&self) -> OperationLog<'_> {
        OperationLog::new(&self.conn, &self.config)
    }

    #[must_use]
    pub fn chunks(&self) -> ChunkLoader<'_> {
        ChunkLoader::new(&self.conn, &self.cache, &self.config)
    }

    #[must_use]
    pub fn versions(&self) -> VersionManager<'_> {
        VersionManager::new(&self.conn, &self.cache, &self.config)
    }

    #[must_use]
    pub const fn diff(&self) -> DiffEngine<'_> {
        DiffEngine::new(&self.conn, &self.config)
    }

    /// Create a document together with its root node, whose content is the
    /// title.
    ///
    /// # Errors
    ///
    /// [`MindmapError::InvalidOperation`] for a blank title, or a database
    /// error.
    pub fn create_document(
        &self,
        ctx: &EditContext,
        new: &NewDocument,
    ) -> Result<(Document, Node)> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(MindmapError::InvalidOperation(
                "document title must not be empty".to_string(),
            ));
        }

        let tx = db::immediate(&self.conn)?;
        if let Some(op_id) = ctx.op_id.as_deref() {
            if let Some(op) = operations::find_by_op_id(&tx, op_id)? {
                drop(tx);
                return self.document_with_root(op.document_id);
            }
        }

        let now = now_us();
        let document_id = documents::insert(
            &tx,
            title,
            new.theme.as_deref().unwrap_or(DEFAULT_THEME),
            new.visibility.as_deref().unwrap_or(DEFAULT_VISIBILITY),
            now,
        )?;
        let placement = Placement {
            document_id,
            parent_id: None,
            rank: 0,
            depth: 0,
        };
        let root_id = nodes::insert(&tx, placement, &NodeFields::with_content(title), now)?;
        let payload = json!({ "title": title, "root": true });
        oplog::append(
            &tx,
            &NewOperation {
                op_id: ctx.op_id.clone().unwrap_or_else(|| {
                    oplog::generate_op_id(document_id, OpType::Create, Some(root_id), &payload)
                }),
                document_id,
                op_type: OpType::Create,
                node_id: Some(root_id),
                payload,
                user_id: ctx.user_id,
                causality_ts: ctx.causality_ts,
            },
        )?;
        tx.commit()?;

        tracing::info!(document_id = %document_id, root_id = %root_id, "created document");
        self.document_with_root(document_id)
    }

    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the document is missing or deleted.
    pub fn get_document(&self, document_id: DocumentId) -> Result<Document> {
        documents::require(&self.conn, document_id)
    }

    /// Live documents, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        documents::list(&self.conn)
    }

    /// Logically delete a document and all of its nodes.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the document is not live.
    pub fn delete_document(&self, document_id: DocumentId) -> Result<usize> {
        let tx = db::immediate(&self.conn)?;
        let nodes = documents::mark_deleted(&tx, document_id, now_us())?;
        tx.commit()?;
        tracing::info!(document_id = %document_id, nodes, "deleted document");
        self.cache.clear_cache(document_id);
        Ok(nodes)
    }

    fn document_with_root(&self, document_id: DocumentId) -> Result<(Document, Node)> {
        let doc = documents::require(&self.conn, document_id)?;
        let root = self.tree().find_root(document_id)?;
        Ok((doc, root))
    }
}

fn load_config_for(path: &Path) -> Result<Config> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => config::load_config(dir),
        _ => config::load_config(Path::new(".")),
    }
}
