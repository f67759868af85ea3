//! Idempotent, causally ordered edit log.
//!
//! Every committed tree edit lands here inside the same transaction as the
//! edit itself. Collaborating clients submit their own `op_id`; a repeated
//! submission is a no-op that hands back the stored record.

use rusqlite::Connection;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Config;
use crate::db::operations;
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, NewOperation, NodeId, OpType, Operation, now_us};

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

static OP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Derive a fresh operation id for an edit that arrived without one.
///
/// The hash input mixes the edit's identity with the wall clock and a
/// process-wide sequence, so two identical edits still get distinct ids.
#[must_use]
pub fn generate_op_id(
    document_id: DocumentId,
    op_type: OpType,
    node_id: Option<NodeId>,
    payload: &serde_json::Value,
) -> String {
    let seq = OP_SEQ.fetch_add(1, Ordering::Relaxed);
    let node = node_id.map_or_else(String::new, |id| id.to_string());
    let hash_input = format!(
        "{}\t{}\t{}\t{}\t{}\t{}\n",
        now_us(),
        seq,
        document_id,
        op_type,
        node,
        payload
    );
    format!("blake3:{}", blake3::hash(hash_input.as_bytes()).to_hex())
}

/// Insert `op` unless its id is already recorded, then return the stored
/// row. Works on any connection, including an open transaction.
pub(crate) fn append(conn: &Connection, op: &NewOperation) -> Result<Operation> {
    if op.op_id.trim().is_empty() {
        return Err(MindmapError::InvalidOperation(
            "op_id must not be empty".to_string(),
        ));
    }
    let now = now_us();
    let causality_ts = op.causality_ts.unwrap_or(now);
    let inserted = operations::insert_or_ignore(conn, op, causality_ts, now)?;
    if inserted {
        tracing::debug!(
            op_id = %op.op_id,
            document_id = %op.document_id,
            op_type = %op.op_type,
            "recorded operation"
        );
    } else {
        tracing::debug!(op_id = %op.op_id, "duplicate operation ignored");
    }
    operations::find_by_op_id(conn, &op.op_id)?
        .ok_or_else(|| MindmapError::not_found("operation", &op.op_id))
}

/// Read and maintenance access to the operation log.
pub struct OperationLog<'a> {
    conn: &'a Connection,
    config: &'a Config,
}

impl<'a> OperationLog<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection, config: &'a Config) -> Self {
        Self { conn, config }
    }

    /// Record an edit at most once.
    ///
    /// A duplicate `op_id` leaves the log untouched and returns the record
    /// stored by the first submission. A missing causality timestamp falls
    /// back to the wall clock, which only approximates real-time order.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::NotFound`] if the document does not exist,
    /// [`MindmapError::InvalidOperation`] for an empty `op_id`, or a database
    /// error.
    pub fn record_operation(&self, op: &NewOperation) -> Result<Operation> {
        crate::db::documents::require(self.conn, op.document_id)?;
        append(self.conn, op)
    }

    /// Operations ascending by creation time; the optional range is
    /// inclusive on both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_operations(
        &self,
        document_id: DocumentId,
        range: Option<(i64, i64)>,
    ) -> Result<Vec<Operation>> {
        operations::list_by_created(self.conn, document_id, range)
    }

    /// The `limit` newest operations, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_recent_operations(
        &self,
        document_id: DocumentId,
        limit: usize,
    ) -> Result<Vec<Operation>> {
        operations::list_recent(self.conn, document_id, limit)
    }

    /// Operations with causality timestamp in `from_ts..=to_ts`, in the order
    /// a replica should apply them.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_operations_for_replay(
        &self,
        document_id: DocumentId,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<Vec<Operation>> {
        operations::list_by_causality(self.conn, document_id, from_ts, to_ts)
    }

    /// Drop operations past the retention window, keeping the most recent
    /// `retention_floor` of the document no matter their age.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn cleanup_old_operations(&self, document_id: DocumentId) -> Result<usize> {
        self.cleanup_old_operations_at(document_id, now_us())
    }

    /// [`Self::cleanup_old_operations`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn cleanup_old_operations_at(&self, document_id: DocumentId, now: i64) -> Result<usize> {
        let retention = &self.config.operations;
        let cutoff = now.saturating_sub(retention.retention_days.saturating_mul(MICROS_PER_DAY));
        let deleted = operations::delete_older_than_keeping(
            self.conn,
            document_id,
            cutoff,
            retention.retention_floor,
        )?;
        if deleted > 0 {
            tracing::info!(
                document_id = %document_id,
                deleted,
                retention_days = retention.retention_days,
                "pruned operation log"
            );
        }
        Ok(deleted)
    }
}
