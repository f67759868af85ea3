//! Structural edits that keep every document a well-formed tree.
//!
//! # Invariants
//!
//! - Exactly one live root per document.
//! - `depth(n) == depth(parent(n)) + 1` for every non-root node.
//! - Live siblings hold the contiguous ranks `0..n`.
//! - Parent links are acyclic.
//!
//! # Transactions
//!
//! Each mutating call opens a `BEGIN IMMEDIATE` transaction, applies the edit,
//! appends the matching operation-log record and commits. A failure anywhere
//! drops the transaction, so nothing partial is ever visible. Holding the
//! write lock for the whole edit is what keeps two concurrent moves from
//! interleaving into a cycle.
//!
//! # Idempotency
//!
//! An [`EditContext`] that carries an `op_id` already present in the log
//! skips the edit and returns the current state instead.

pub mod walk;

use rusqlite::{Connection, Transaction};
use serde_json::json;
use std::collections::HashSet;

use crate::chunk::ChunkCache;
use crate::config::Config;
use crate::db::nodes::{self, Placement};
use crate::db::{self, documents, operations};
use crate::error::{MindmapError, Result};
use crate::model::{
    DocumentId, NewOperation, Node, NodeFields, NodeId, NodePatch, OpType, Operation, now_us,
};
use crate::oplog::{self, generate_op_id};

pub use walk::{IntegrityReport, Violation};

/// Who is editing, and how the edit is identified in the operation log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditContext {
    pub user_id: i64,
    /// Client idempotency key; a fresh one is generated when absent.
    pub op_id: Option<String>,
    /// Logical ordering key; wall clock when absent.
    pub causality_ts: Option<i64>,
}

impl EditContext {
    #[must_use]
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_op_id(mut self, op_id: impl Into<String>) -> Self {
        self.op_id = Some(op_id.into());
        self
    }

    #[must_use]
    pub const fn at(mut self, causality_ts: i64) -> Self {
        self.causality_ts = Some(causality_ts);
        self
    }
}

/// Tree edits and reads over one connection.
pub struct TreeMutator<'a> {
    conn: &'a Connection,
    cache: &'a ChunkCache,
    config: &'a Config,
}

impl<'a> TreeMutator<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, cache: &'a ChunkCache, config: &'a Config) -> Self {
        Self {
            conn,
            cache,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a node under `parent_id`, appended after its last child, or the
    /// document root when `parent_id` is `None`.
    ///
    /// # Errors
    ///
    /// - [`MindmapError::NotFound`] if the document or parent is missing.
    /// - [`MindmapError::InvalidReference`] if the parent belongs to another
    ///   document.
    /// - [`MindmapError::InvalidOperation`] for a second root or a node past
    ///   the depth limit.
    pub fn create_node(
        &self,
        ctx: &EditContext,
        document_id: DocumentId,
        parent_id: Option<NodeId>,
        fields: &NodeFields,
    ) -> Result<Node> {
        let (tx, prior) = self.begin(ctx)?;
        if let Some(op) = prior {
            drop(tx);
            let id = op
                .node_id
                .ok_or_else(|| MindmapError::not_found("node for operation", &op.op_id))?;
            return nodes::require(self.conn, id);
        }

        documents::require(&tx, document_id)?;
        let placement = match parent_id {
            Some(parent_id) => {
                let parent = nodes::require(&tx, parent_id)?;
                if parent.document_id != document_id {
                    return Err(foreign_node(parent_id, parent.document_id, document_id));
                }
                let depth = parent.depth + 1;
                self.ensure_depth(depth)?;
                Placement {
                    document_id,
                    parent_id: Some(parent_id),
                    rank: nodes::next_rank(&tx, parent_id)?,
                    depth,
                }
            }
            None => {
                if let Some(root) = nodes::find_root(&tx, document_id)? {
                    return Err(MindmapError::InvalidOperation(format!(
                        "document {document_id} already has root node {}",
                        root.id
                    )));
                }
                Placement {
                    document_id,
                    parent_id: None,
                    rank: 0,
                    depth: 0,
                }
            }
        };

        let id = nodes::insert(&tx, placement, fields, now_us())?;
        self.record(
            &tx,
            ctx,
            document_id,
            OpType::Create,
            Some(id),
            json!({
                "parentId": parent_id,
                "content": fields.content,
                "depth": placement.depth,
            }),
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %document_id,
            node_id = %id,
            depth = placement.depth,
            "created node"
        );
        self.cache.clear_cache(document_id);
        nodes::require(self.conn, id)
    }

    /// Move `node_id` under `new_parent_id` at `target_index` (clamped to the
    /// new sibling list; append when `None`).
    ///
    /// Moving the root to no parent is a no-op. Depths of the whole moved
    /// subtree are recomputed level by level.
    ///
    /// # Errors
    ///
    /// - [`MindmapError::NotFound`] if either node is missing.
    /// - [`MindmapError::InvalidReference`] for a target in another document.
    /// - [`MindmapError::InvalidOperation`] when the target is the node itself
    ///   or one of its descendants, when a non-root would become a second
    ///   root, or when the subtree would pass the depth limit.
    /// - [`MindmapError::DataIntegrity`] if the ancestor walk finds corrupt
    ///   parent links.
    pub fn move_node(
        &self,
        ctx: &EditContext,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
        target_index: Option<usize>,
    ) -> Result<Node> {
        let (tx, prior) = self.begin(ctx)?;
        if prior.is_some() {
            drop(tx);
            return nodes::require(self.conn, node_id);
        }

        let node = nodes::require(&tx, node_id)?;
        let Some(new_parent_id) = new_parent_id else {
            if node.is_root() {
                return Ok(node);
            }
            return Err(MindmapError::InvalidOperation(format!(
                "node {node_id} cannot become a second root of document {}",
                node.document_id
            )));
        };
        if new_parent_id == node_id {
            return Err(MindmapError::InvalidOperation(format!(
                "node {node_id} cannot be its own parent"
            )));
        }
        let new_parent = nodes::require(&tx, new_parent_id)?;
        if new_parent.document_id != node.document_id {
            return Err(foreign_node(
                new_parent_id,
                new_parent.document_id,
                node.document_id,
            ));
        }
        if walk::chain_contains(
            &tx,
            new_parent_id,
            node_id,
            self.config.tree.max_ancestor_hops,
        )? {
            return Err(MindmapError::InvalidOperation(format!(
                "cannot move node {node_id} under its own descendant {new_parent_id}"
            )));
        }

        let levels = walk::subtree_levels(&tx, node_id)?;
        let new_depth = new_parent.depth + 1;
        self.ensure_depth(new_depth + crate::db::sql_count(levels.len()) - 1)?;

        let old_parent_id = node.parent_id;
        let mut siblings: Vec<NodeId> = new_parent
            .children_order
            .iter()
            .copied()
            .filter(|&id| id != node_id)
            .collect();
        let index = target_index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, node_id);

        let now = now_us();
        nodes::attach(&tx, node_id, Some(new_parent_id), 0, new_depth, now)?;
        nodes::set_ranks(&tx, new_parent_id, &siblings, now)?;
        if let Some(old_parent_id) = old_parent_id.filter(|&p| p != new_parent_id) {
            let remaining: Vec<NodeId> = nodes::child_ids(&tx, old_parent_id)?;
            nodes::set_ranks(&tx, old_parent_id, &remaining, now)?;
        }
        for (offset, level) in (0_i64..).zip(&levels).skip(1) {
            for &id in level {
                nodes::set_depth(&tx, id, new_depth + offset)?;
            }
        }

        self.record(
            &tx,
            ctx,
            node.document_id,
            OpType::Move,
            Some(node_id),
            json!({
                "oldParentId": old_parent_id,
                "newParentId": new_parent_id,
                "index": index,
            }),
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %node.document_id,
            node_id = %node_id,
            new_parent_id = %new_parent_id,
            index,
            moved = levels.iter().map(Vec::len).sum::<usize>(),
            "moved node"
        );
        self.cache.clear_cache(node.document_id);
        nodes::require(self.conn, node_id)
    }

    /// Logically delete `node_id` and its whole subtree. Returns how many
    /// nodes were deleted (0 when the edit was a replay).
    ///
    /// # Errors
    ///
    /// [`MindmapError::InvalidOperation`] for the root, which would leave the
    /// document without one; [`MindmapError::NotFound`] for a missing node.
    pub fn delete_node(&self, ctx: &EditContext, node_id: NodeId) -> Result<usize> {
        let (tx, prior) = self.begin(ctx)?;
        if prior.is_some() {
            return Ok(0);
        }

        let node = nodes::require(&tx, node_id)?;
        let Some(parent_id) = node.parent_id else {
            return Err(MindmapError::InvalidOperation(format!(
                "node {node_id} is the root of document {}",
                node.document_id
            )));
        };

        let rank = nodes::rank_of(&tx, node_id)?;
        let subtree = walk::subtree_ids(&tx, node_id)?;
        let now = now_us();
        let deleted = nodes::mark_deleted(&tx, &subtree, now)?;
        nodes::close_gap(&tx, parent_id, rank)?;

        self.record(
            &tx,
            ctx,
            node.document_id,
            OpType::Delete,
            Some(node_id),
            json!({ "parentId": parent_id, "deletedCount": deleted }),
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %node.document_id,
            node_id = %node_id,
            deleted,
            "deleted subtree"
        );
        self.cache.clear_cache(node.document_id);
        Ok(deleted)
    }

    /// Reorder the children of `parent_id` to exactly `ordered_ids`.
    ///
    /// # Errors
    ///
    /// [`MindmapError::InvalidOperation`] unless `ordered_ids` is a
    /// permutation of the parent's live children.
    pub fn reorder_children(
        &self,
        ctx: &EditContext,
        parent_id: NodeId,
        ordered_ids: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        let (tx, prior) = self.begin(ctx)?;
        if prior.is_some() {
            drop(tx);
            return nodes::child_ids(self.conn, parent_id);
        }

        let parent = nodes::require(&tx, parent_id)?;
        let current: HashSet<NodeId> = parent.children_order.iter().copied().collect();
        let proposed: HashSet<NodeId> = ordered_ids.iter().copied().collect();
        if ordered_ids.len() != parent.children_order.len()
            || proposed.len() != ordered_ids.len()
            || proposed != current
        {
            return Err(MindmapError::InvalidOperation(format!(
                "order {ordered_ids:?} is not a permutation of the children of node {parent_id}"
            )));
        }

        nodes::set_ranks(&tx, parent_id, ordered_ids, now_us())?;
        self.record(
            &tx,
            ctx,
            parent.document_id,
            OpType::Reorder,
            Some(parent_id),
            json!({ "order": ordered_ids }),
        )?;
        tx.commit()?;

        tracing::info!(
            document_id = %parent.document_id,
            parent_id = %parent_id,
            "reordered children"
        );
        self.cache.clear_cache(parent.document_id);
        nodes::child_ids(self.conn, parent_id)
    }

    /// Apply `patch` to one node's non-structural fields.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the node is missing.
    pub fn update_node(
        &self,
        ctx: &EditContext,
        node_id: NodeId,
        patch: &NodePatch,
    ) -> Result<Node> {
        let (tx, prior) = self.begin(ctx)?;
        let mut node = nodes::require(&tx, node_id)?;
        if prior.is_some() || patch.is_empty() {
            return Ok(node);
        }

        patch.apply_to(&mut node);
        node.updated_at_us = now_us();
        nodes::save(&tx, &node)?;
        self.record(
            &tx,
            ctx,
            node.document_id,
            OpType::Update,
            Some(node_id),
            serde_json::to_value(patch)?,
        )?;
        let ancestors = self.chunk_ancestors(&tx, node_id)?;
        tx.commit()?;

        tracing::info!(document_id = %node.document_id, node_id = %node_id, "updated node");
        self.invalidate_fields(&node, &ancestors);
        Ok(node)
    }

    /// Apply the same `patch` to every node in `node_ids`.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for an unknown id and
    /// [`MindmapError::InvalidReference`] if the nodes span documents.
    pub fn batch_update_nodes(
        &self,
        ctx: &EditContext,
        node_ids: &[NodeId],
        patch: &NodePatch,
    ) -> Result<Vec<Node>> {
        let (tx, prior) = self.begin(ctx)?;
        let mut batch = node_ids
            .iter()
            .map(|&id| nodes::require(&tx, id))
            .collect::<Result<Vec<_>>>()?;
        let Some(document_id) = batch.first().map(|n| n.document_id) else {
            return Ok(batch);
        };
        if let Some(stray) = batch.iter().find(|n| n.document_id != document_id) {
            return Err(foreign_node(stray.id, stray.document_id, document_id));
        }
        if prior.is_some() || patch.is_empty() {
            return Ok(batch);
        }

        let now = now_us();
        for node in &mut batch {
            patch.apply_to(node);
            node.updated_at_us = now;
        }
        nodes::save_all(&tx, &batch)?;
        self.record(
            &tx,
            ctx,
            document_id,
            OpType::BatchUpdate,
            None,
            json!({ "nodeIds": node_ids, "patch": patch }),
        )?;
        let ancestors = batch
            .iter()
            .map(|node| self.chunk_ancestors(&tx, node.id))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;

        tracing::info!(document_id = %document_id, count = batch.len(), "batch updated nodes");
        for (node, ancestors) in batch.iter().zip(&ancestors) {
            self.invalidate_fields(node, ancestors);
        }
        Ok(batch)
    }

    /// Flip the collapsed flag of a node.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the node is missing.
    pub fn toggle_collapse(&self, ctx: &EditContext, node_id: NodeId) -> Result<Node> {
        let (tx, prior) = self.begin(ctx)?;
        let mut node = nodes::require(&tx, node_id)?;
        if prior.is_some() {
            return Ok(node);
        }

        node.collapsed = !node.collapsed;
        node.updated_at_us = now_us();
        nodes::save(&tx, &node)?;
        self.record(
            &tx,
            ctx,
            node.document_id,
            OpType::Collapse,
            Some(node_id),
            json!({ "collapsed": node.collapsed }),
        )?;
        let ancestors = self.chunk_ancestors(&tx, node_id)?;
        tx.commit()?;

        tracing::info!(node_id = %node_id, collapsed = node.collapsed, "toggled collapse");
        self.invalidate_fields(&node, &ancestors);
        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the node is missing.
    pub fn get_node(&self, node_id: NodeId) -> Result<Node> {
        nodes::require(self.conn, node_id)
    }

    /// Live children of a node in sibling order.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the node is missing.
    pub fn get_children(&self, node_id: NodeId) -> Result<Vec<Node>> {
        nodes::require(self.conn, node_id)?;
        nodes::find_children_of(self.conn, node_id)
    }

    /// Ancestors of a node, parent first, root last.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for a missing node and
    /// [`MindmapError::DataIntegrity`] for corrupt parent links.
    pub fn get_ancestors(&self, node_id: NodeId) -> Result<Vec<Node>> {
        walk::ancestor_ids(self.conn, node_id, self.config.tree.max_ancestor_hops)?
            .into_iter()
            .map(|id| nodes::require(self.conn, id))
            .collect()
    }

    /// Ids of the live subtree rooted at `node_id`, breadth-first.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the node is missing.
    pub fn get_subtree_ids(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        nodes::require(self.conn, node_id)?;
        walk::subtree_ids(self.conn, node_id)
    }

    /// The live root of a document.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] if the document has no live root.
    pub fn find_root(&self, document_id: DocumentId) -> Result<Node> {
        nodes::find_root(self.conn, document_id)?
            .ok_or_else(|| MindmapError::not_found("root node of document", document_id))
    }

    /// Audit a document against the tree invariants.
    ///
    /// # Errors
    ///
    /// [`MindmapError::NotFound`] for a missing document, or a database error.
    pub fn check_integrity(&self, document_id: DocumentId) -> Result<IntegrityReport> {
        documents::require(self.conn, document_id)?;
        walk::check_integrity(self.conn, document_id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Take the write lock and look up a prior application of `ctx.op_id`.
    fn begin(&self, ctx: &EditContext) -> Result<(Transaction<'a>, Option<Operation>)> {
        let tx = db::immediate(self.conn)?;
        let prior = match ctx.op_id.as_deref() {
            Some(op_id) => operations::find_by_op_id(&tx, op_id)?,
            None => None,
        };
        if let Some(op) = &prior {
            tracing::debug!(op_id = %op.op_id, "edit already applied, skipping");
        }
        Ok((tx, prior))
    }

    fn record(
        &self,
        conn: &Connection,
        ctx: &EditContext,
        document_id: DocumentId,
        op_type: OpType,
        node_id: Option<NodeId>,
        payload: serde_json::Value,
    ) -> Result<Operation> {
        let op_id = ctx
            .op_id
            .clone()
            .unwrap_or_else(|| generate_op_id(document_id, op_type, node_id, &payload));
        oplog::append(
            conn,
            &NewOperation {
                op_id,
                document_id,
                op_type,
                node_id,
                payload,
                user_id: ctx.user_id,
                causality_ts: ctx.causality_ts,
            },
        )
    }

    fn ensure_depth(&self, depth: i64) -> Result<()> {
        let max_depth = self.config.tree.max_depth;
        if depth > max_depth {
            return Err(MindmapError::InvalidOperation(format!(
                "depth {depth} exceeds the limit of {max_depth}"
            )));
        }
        Ok(())
    }

    /// Ancestors of `node_id` whose subtree chunks can show it: at most
    /// `max_depth_per_chunk` hops up. Read before commit so nothing after the
    /// write can fail.
    fn chunk_ancestors(&self, conn: &Connection, node_id: NodeId) -> Result<Vec<NodeId>> {
        let reach = usize::try_from(self.config.chunks.max_depth_per_chunk).unwrap_or(0);
        walk::nearest_ancestors(conn, node_id, reach)
    }

    /// Drop the chunks a field-only edit of `node` can show up in: the root
    /// chunk when the node is shallow enough, and the subtree chunks of the
    /// node and of `ancestors`.
    fn invalidate_fields(&self, node: &Node, ancestors: &[NodeId]) {
        if node.depth <= self.config.chunks.max_depth_per_chunk {
            self.cache.clear_root_chunk(node.document_id);
        }
        self.cache.clear_subtree_cache(node.document_id, node.id);
        for &ancestor in ancestors {
            self.cache.clear_subtree_cache(node.document_id, ancestor);
        }
    }
}

fn foreign_node(node_id: NodeId, actual: DocumentId, expected: DocumentId) -> MindmapError {
    MindmapError::InvalidReference(format!(
        "node {node_id} belongs to document {actual}, not {expected}"
    ))
}
