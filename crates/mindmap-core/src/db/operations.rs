//! Operation-log rows.
//!
//! `op_id` carries a UNIQUE constraint; recording goes through
//! `INSERT ... ON CONFLICT(op_id) DO NOTHING` so that concurrent duplicate
//! submissions collapse to one row without a read-then-write race.

use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::db::sql_count;
use crate::error::Result;
use crate::model::{DocumentId, NewOperation, OpType, Operation};

const OPERATION_COLUMNS: &str =
    "id, op_id, document_id, node_id, op_type, payload, user_id, causality_ts, created_at_us";

fn map_operation(row: &Row<'_>) -> rusqlite::Result<Operation> {
    let raw_type: String = row.get(4)?;
    let op_type = raw_type
        .parse::<OpType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let raw_payload: String = row.get(5)?;
    let payload = serde_json::from_str(&raw_payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Operation {
        id: row.get(0)?,
        op_id: row.get(1)?,
        document_id: row.get(2)?,
        node_id: row.get(3)?,
        op_type,
        payload,
        user_id: row.get(6)?,
        causality_ts: row.get(7)?,
        created_at_us: row.get(8)?,
    })
}

/// Insert `op` unless its `op_id` is already present.
///
/// Returns `true` when a row was written.
///
/// # Errors
///
/// Returns an error if the payload cannot be encoded or the insert fails.
pub fn insert_or_ignore(
    conn: &Connection,
    op: &NewOperation,
    causality_ts: i64,
    now_us: i64,
) -> Result<bool> {
    let payload = serde_json::to_string(&op.payload)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO operations \
         (op_id, document_id, node_id, op_type, payload, user_id, causality_ts, created_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(op_id) DO NOTHING",
    )?;
    let inserted = stmt.execute(params![
        op.op_id,
        op.document_id,
        op.node_id,
        op.op_type.as_str(),
        payload,
        op.user_id,
        causality_ts,
        now_us,
    ])?;
    Ok(inserted == 1)
}

/// Fetch an operation by its idempotency key.
///
/// # Errors
///
/// Returns an error if the query fails or the stored row is malformed.
pub fn find_by_op_id(conn: &Connection, op_id: &str) -> Result<Option<Operation>> {
    let sql = format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE op_id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.query_row(params![op_id], map_operation).optional()?)
}

/// Operations of a document ordered by creation time, optionally limited to
/// `created_at_us` within the inclusive range.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_by_created(
    conn: &Connection,
    document_id: DocumentId,
    range: Option<(i64, i64)>,
) -> Result<Vec<Operation>> {
    let (from, to) = range.unwrap_or((i64::MIN, i64::MAX));
    let sql = format!(
        "SELECT {OPERATION_COLUMNS} FROM operations \
         WHERE document_id = ?1 AND created_at_us BETWEEN ?2 AND ?3 \
         ORDER BY created_at_us, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id, from, to], map_operation)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The `limit` most recent operations of a document, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_recent(
    conn: &Connection,
    document_id: DocumentId,
    limit: usize,
) -> Result<Vec<Operation>> {
    let sql = format!(
        "SELECT {OPERATION_COLUMNS} FROM operations WHERE document_id = ?1 \
         ORDER BY created_at_us DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id, sql_count(limit)], map_operation)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Operations whose causality timestamp lies in the inclusive range, in
/// replay order: causality, then creation time, then row id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_by_causality(
    conn: &Connection,
    document_id: DocumentId,
    from_ts: i64,
    to_ts: i64,
) -> Result<Vec<Operation>> {
    let sql = format!(
        "SELECT {OPERATION_COLUMNS} FROM operations \
         WHERE document_id = ?1 AND causality_ts BETWEEN ?2 AND ?3 \
         ORDER BY causality_ts, created_at_us, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id, from_ts, to_ts], map_operation)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete operations created before `cutoff_us`, sparing the `keep` most
/// recent of the document regardless of age. Returns the number deleted.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_older_than_keeping(
    conn: &Connection,
    document_id: DocumentId,
    cutoff_us: i64,
    keep: usize,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM operations \
         WHERE document_id = ?1 AND created_at_us < ?2 \
           AND id NOT IN ( \
             SELECT id FROM operations WHERE document_id = ?1 \
             ORDER BY created_at_us DESC, id DESC LIMIT ?3 \
           )",
        params![document_id, cutoff_us, sql_count(keep)],
    )?)
}
