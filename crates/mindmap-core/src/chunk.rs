//! Bounded subtree reads with a shared TTL cache.
//!
//! A chunk is a breadth-first slice of the tree below some node: at most
//! `chunk_size` nodes (the chunk root included) and at most
//! `max_depth_per_chunk` levels below the chunk root. Returned nodes that
//! still have unreturned live children are listed in `frontier`, which is
//! what a client expands next.
//!
//! [`ChunkCache`] is `Sync` and meant to be shared as `Arc<ChunkCache>`
//! between every connection that serves the same database. Mutations
//! invalidate it; anything they miss ages out after the TTL.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::db::{documents, nodes};
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, Node, NodeId};

/// Which kind of node a chunk hangs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Root,
    Subtree,
}

/// Cache key of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKey {
    Root(DocumentId),
    Subtree(DocumentId, NodeId),
}

impl ChunkKey {
    #[must_use]
    pub const fn document_id(self) -> DocumentId {
        match self {
            Self::Root(doc) | Self::Subtree(doc, _) => doc,
        }
    }

    #[must_use]
    pub const fn kind(self) -> ChunkKind {
        match self {
            Self::Root(_) => ChunkKind::Root,
            Self::Subtree(..) => ChunkKind::Subtree,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(_) => f.write_str("root"),
            Self::Subtree(_, node) => write!(f, "subtree:{node}"),
        }
    }
}

/// A bounded slice of one document's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_key: String,
    pub kind: ChunkKind,
    pub document_id: DocumentId,
    pub root_node: Node,
    /// Everything below the chunk root, breadth-first in sibling order.
    pub child_nodes: Vec<Node>,
    pub node_count: usize,
    /// Deepest absolute depth among the returned nodes.
    pub max_depth: i64,
    pub has_more: bool,
    /// Returned nodes that still have live children outside the chunk.
    pub frontier: Vec<NodeId>,
}

/// Hit/miss counters plus the current entry count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CachedChunk {
    chunk: Arc<Chunk>,
    stored_at: Instant,
}

/// Thread-safe TTL cache of built chunks.
pub struct ChunkCache {
    ttl: Duration,
    entries: Mutex<HashMap<ChunkKey, CachedChunk>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ChunkCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChunkKey, CachedChunk>> {
        // A panic while holding the lock leaves the map itself intact.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: ChunkKey) -> Option<Arc<Chunk>> {
        let mut entries = self.lock();
        let fresh = entries
            .get(&key)
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.chunk));
        if fresh.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            entries.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    fn put(&self, key: ChunkKey, chunk: Arc<Chunk>) {
        self.lock().insert(
            key,
            CachedChunk {
                chunk,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every cached chunk of a document. Returns how many were dropped.
    pub fn clear_cache(&self, document_id: DocumentId) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.document_id() != document_id);
        let dropped = before - entries.len();
        tracing::debug!(document_id = %document_id, dropped, "cleared chunk cache");
        dropped
    }

    /// Drop the cached root chunk of a document.
    pub fn clear_root_chunk(&self, document_id: DocumentId) -> bool {
        self.lock().remove(&ChunkKey::Root(document_id)).is_some()
    }

    /// Drop the cached subtree chunk hanging from `node_id`.
    pub fn clear_subtree_cache(&self, document_id: DocumentId, node_id: NodeId) -> bool {
        self.lock()
            .remove(&ChunkKey::Subtree(document_id, node_id))
            .is_some()
    }

    /// Remove entries past their TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, cached| cached.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().len(),
        }
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(crate::config::ChunkConfig::default().ttl())
    }
}

/// Chunk reads over one connection, backed by a shared [`ChunkCache`].
pub struct ChunkLoader<'a> {
    conn: &'a Connection,
    cache: &'a ChunkCache,
    config: &'a Config,
}

impl<'a> ChunkLoader<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, cache: &'a ChunkCache, config: &'a Config) -> Self {
        Self {
            conn,
            cache,
            config,
        }
    }

    /// The chunk hanging from the document's root.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::NotFound`] if the document or its root is
    /// missing, or a database error.
    pub fn get_root_chunk(&self, document_id: DocumentId) -> Result<Arc<Chunk>> {
        let key = ChunkKey::Root(document_id);
        if let Some(chunk) = self.cache.get(key) {
            tracing::debug!(document_id = %document_id, "root chunk cache hit");
            return Ok(chunk);
        }
        documents::require(self.conn, document_id)?;
        let root = nodes::find_root(self.conn, document_id)?
            .ok_or_else(|| MindmapError::not_found("root node of document", document_id))?;
        self.build_and_store(key, root)
    }

    /// The chunk hanging from `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::NotFound`] if the node is missing, and
    /// [`MindmapError::InvalidReference`] if it belongs to another document.
    pub fn get_subtree_chunk(
        &self,
        document_id: DocumentId,
        node_id: NodeId,
    ) -> Result<Arc<Chunk>> {
        let key = ChunkKey::Subtree(document_id, node_id);
        if let Some(chunk) = self.cache.get(key) {
            tracing::debug!(
                document_id = %document_id,
                node_id = %node_id,
                "subtree chunk cache hit"
            );
            return Ok(chunk);
        }
        let node = nodes::require(self.conn, node_id)?;
        if node.document_id != document_id {
            return Err(MindmapError::InvalidReference(format!(
                "node {node_id} belongs to document {}, not {document_id}",
                node.document_id
            )));
        }
        self.build_and_store(key, node)
    }

    /// Every live node whose depth lies in `from_depth..=to_depth`,
    /// shallowest first. Not cached.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::InvalidOperation`] for an inverted range, or a
    /// database error.
    pub fn load_nodes_by_level(
        &self,
        document_id: DocumentId,
        from_depth: i64,
        to_depth: i64,
    ) -> Result<Vec<Node>> {
        if from_depth > to_depth {
            return Err(MindmapError::InvalidOperation(format!(
                "depth range {from_depth}..={to_depth} is empty"
            )));
        }
        documents::require(self.conn, document_id)?;
        nodes::find_by_depth_range(self.conn, document_id, from_depth, to_depth)
    }

    /// See [`ChunkCache::clear_cache`].
    pub fn clear_cache(&self, document_id: DocumentId) -> usize {
        self.cache.clear_cache(document_id)
    }

    /// See [`ChunkCache::clear_subtree_cache`].
    pub fn clear_subtree_cache(&self, document_id: DocumentId, node_id: NodeId) -> bool {
        self.cache.clear_subtree_cache(document_id, node_id)
    }

    fn build_and_store(&self, key: ChunkKey, root: Node) -> Result<Arc<Chunk>> {
        let chunk = Arc::new(self.build(key, root)?);
        tracing::debug!(
            document_id = %chunk.document_id,
            chunk = %chunk.chunk_key,
            nodes = chunk.node_count,
            has_more = chunk.has_more,
            "built chunk"
        );
        self.cache.put(key, Arc::clone(&chunk));
        Ok(chunk)
    }

    fn build(&self, key: ChunkKey, root: Node) -> Result<Chunk> {
        let limits = &self.config.chunks;
        let budget = limits.chunk_size.max(1);
        let mut seen = HashSet::from([root.id]);
        let mut child_nodes: Vec<Node> = Vec::new();
        let mut frontier = Vec::new();
        let mut max_depth = root.depth;
        let mut queue: VecDeque<(NodeId, bool, i64)> = VecDeque::new();
        queue.push_back((root.id, !root.children_order.is_empty(), 0));

        while let Some((id, has_children, level)) = queue.pop_front() {
            if !has_children {
                continue;
            }
            if level >= limits.max_depth_per_chunk || 1 + child_nodes.len() >= budget {
                frontier.push(id);
                continue;
            }
            let mut truncated = false;
            for child in nodes::find_children_of(self.conn, id)? {
                if 1 + child_nodes.len() >= budget {
                    truncated = true;
                    break;
                }
                if !seen.insert(child.id) {
                    continue;
                }
                max_depth = max_depth.max(child.depth);
                queue.push_back((child.id, !child.children_order.is_empty(), level + 1));
                child_nodes.push(child);
            }
            if truncated {
                frontier.push(id);
            }
        }

        Ok(Chunk {
            chunk_key: key.to_string(),
            kind: key.kind(),
            document_id: key.document_id(),
            node_count: 1 + child_nodes.len(),
            root_node: root,
            child_nodes,
            max_depth,
            has_more: !frontier.is_empty(),
            frontier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::nodes::Placement;
    use crate::db::{documents, open_in_memory};
    use crate::model::NodeFields;

    struct Fixture {
        conn: Connection,
        doc: DocumentId,
        root: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let conn = open_in_memory().expect("open");
            let doc = documents::insert(&conn, "Doc", "default", "private", 1).expect("doc");
            let root = nodes::insert(
                &conn,
                Placement {
                    document_id: doc,
                    parent_id: None,
                    rank: 0,
                    depth: 0,
                },
                &NodeFields::with_content("root"),
                1,
            )
            .expect("root");
            Self { conn, doc, root }
        }

        fn add(&self, parent: NodeId) -> NodeId {
            let depth = nodes::require(&self.conn, parent).expect("parent").depth + 1;
            let rank = nodes::next_rank(&self.conn, parent).expect("rank");
            nodes::insert(
                &self.conn,
                Placement {
                    document_id: self.doc,
                    parent_id: Some(parent),
                    rank,
                    depth,
                },
                &NodeFields::with_content("n"),
                1,
            )
            .expect("insert")
        }

        fn chain(&self, from: NodeId, len: usize) -> Vec<NodeId> {
            let mut ids = vec![from];
            for _ in 0..len {
                let last = *ids.last().expect("non-empty");
                ids.push(self.add(last));
            }
            ids
        }
    }

    #[test]
    fn depth_bound_marks_frontier() {
        let f = Fixture::new();
        // root -> n1 -> n2 -> n3 -> n4
        let chain = f.chain(f.root, 4);
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let chunk = loader.get_root_chunk(f.doc).expect("chunk");
        assert_eq!(chunk.kind, ChunkKind::Root);
        assert_eq!(chunk.node_count, 4);
        assert_eq!(chunk.max_depth, 3);
        assert!(chunk.has_more);
        assert_eq!(chunk.frontier, vec![chain[3]]);
    }

    #[test]
    fn size_bound_counts_the_root() {
        let f = Fixture::new();
        for _ in 0..150 {
            f.add(f.root);
        }
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let chunk = loader.get_root_chunk(f.doc).expect("chunk");
        assert_eq!(chunk.node_count, 100);
        assert_eq!(chunk.child_nodes.len(), 99);
        assert!(chunk.has_more);
        assert_eq!(chunk.frontier, vec![f.root]);
    }

    #[test]
    fn small_tree_has_no_more() {
        let f = Fixture::new();
        let a = f.add(f.root);
        f.add(a);
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let chunk = loader.get_subtree_chunk(f.doc, a).expect("chunk");
        assert_eq!(chunk.chunk_key, format!("subtree:{a}"));
        assert_eq!(chunk.node_count, 2);
        assert!(!chunk.has_more);
        assert!(chunk.frontier.is_empty());
    }

    #[test]
    fn cache_hits_until_cleared() {
        let f = Fixture::new();
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let first = loader.get_root_chunk(f.doc).expect("chunk");
        let second = loader.get_root_chunk(f.doc).expect("chunk");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);

        assert_eq!(loader.clear_cache(f.doc), 1);
        let third = loader.get_root_chunk(f.doc).expect("chunk");
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn zero_ttl_never_hits() {
        let f = Fixture::new();
        let config = Config::default();
        let cache = ChunkCache::new(Duration::ZERO);
        let loader = ChunkLoader::new(&f.conn, &cache, &config);
        loader.get_root_chunk(f.doc).expect("chunk");
        loader.get_root_chunk(f.doc).expect("chunk");
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn foreign_node_is_invalid_reference() {
        let f = Fixture::new();
        let other = documents::insert(&f.conn, "Other", "default", "private", 1).expect("doc");
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let err = loader.get_subtree_chunk(other, f.root).expect_err("foreign");
        assert!(matches!(err, MindmapError::InvalidReference(_)));
        let err = loader.get_subtree_chunk(f.doc, NodeId(9_999)).expect_err("missing");
        assert!(matches!(err, MindmapError::NotFound { .. }));
    }

    #[test]
    fn levels_filter_by_depth() {
        let f = Fixture::new();
        let chain = f.chain(f.root, 3);
        let config = Config::default();
        let cache = ChunkCache::default();
        let loader = ChunkLoader::new(&f.conn, &cache, &config);

        let ids: Vec<_> = loader
            .load_nodes_by_level(f.doc, 1, 2)
            .expect("levels")
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![chain[1], chain[2]]);
        assert!(loader.load_nodes_by_level(f.doc, 3, 1).is_err());
    }
}
