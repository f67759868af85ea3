//! Version snapshot rows.
//!
//! Version numbers are allocated inside the inserting statement, and the
//! `(document_id, version_number)` UNIQUE constraint backs that up, so two
//! writers can never mint the same number.

use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use crate::db::sql_count;
use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, Version, VersionId, VersionType};

const VERSION_COLUMNS: &str = "version_id, document_id, version_number, version_type, name, \
     description, snapshot_data, node_count, snapshot_size, created_by, created_at_us";

fn map_version(row: &Row<'_>) -> rusqlite::Result<Version> {
    let raw_type: String = row.get(3)?;
    let version_type = raw_type.parse::<VersionType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(Version {
        id: row.get(0)?,
        document_id: row.get(1)?,
        version_number: row.get(2)?,
        version_type,
        name: row.get(4)?,
        description: row.get(5)?,
        snapshot_data: row.get(6)?,
        node_count: row.get(7)?,
        snapshot_size: row.get(8)?,
        created_by: row.get(9)?,
        created_at_us: row.get(10)?,
    })
}

/// A snapshot about to be stored.
#[derive(Debug, Clone)]
pub struct NewVersion<'a> {
    pub document_id: DocumentId,
    pub version_type: VersionType,
    /// Explicit name; `None` yields "Version N" or "Autosave N".
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub snapshot_data: &'a str,
    pub node_count: usize,
    pub created_by: Option<i64>,
}

const fn default_name_prefix(version_type: VersionType) -> &'static str {
    match version_type {
        VersionType::Autosave => "Autosave",
        VersionType::Explicit => "Version",
    }
}

/// Insert a version with the next number for its document.
///
/// Numbering counts soft-deleted rows too, so numbers are never reused.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_next(conn: &Connection, version: &NewVersion<'_>, now_us: i64) -> Result<VersionId> {
    conn.execute(
        "INSERT INTO versions (document_id, version_number, version_type, name, description, \
             snapshot_data, node_count, snapshot_size, created_by, created_at_us) \
         SELECT ?1, next.n, ?2, COALESCE(?3, ?4 || ' ' || next.n), ?5, ?6, ?7, ?8, ?9, ?10 \
         FROM (SELECT COALESCE(MAX(version_number), 0) + 1 AS n \
               FROM versions WHERE document_id = ?1) AS next",
        params![
            version.document_id,
            version.version_type.as_str(),
            version.name,
            default_name_prefix(version.version_type),
            version.description,
            version.snapshot_data,
            sql_count(version.node_count),
            sql_count(version.snapshot_data.len()),
            version.created_by,
            now_us,
        ],
    )?;
    Ok(VersionId(conn.last_insert_rowid()))
}

/// Fetch a live version.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_id(conn: &Connection, id: VersionId) -> Result<Option<Version>> {
    let sql =
        format!("SELECT {VERSION_COLUMNS} FROM versions WHERE version_id = ?1 AND is_deleted = 0");
    Ok(conn.query_row(&sql, params![id], map_version).optional()?)
}

/// Fetch a live version or fail with `NotFound`.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] when absent, or a database error.
pub fn require(conn: &Connection, id: VersionId) -> Result<Version> {
    find_by_id(conn, id)?.ok_or_else(|| MindmapError::not_found("version", id))
}

/// Live versions of a document, newest first, optionally of one type.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(
    conn: &Connection,
    document_id: DocumentId,
    version_type: Option<VersionType>,
) -> Result<Vec<Version>> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM versions \
         WHERE document_id = ?1 AND is_deleted = 0 AND (?2 IS NULL OR version_type = ?2) \
         ORDER BY version_number DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![document_id, version_type.map(VersionType::as_str)],
        map_version,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Highest version number among the document's live versions.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn max_live_number(conn: &Connection, document_id: DocumentId) -> Result<Option<i64>> {
    Ok(conn.query_row(
        "SELECT MAX(version_number) FROM versions WHERE document_id = ?1 AND is_deleted = 0",
        params![document_id],
        |row| row.get(0),
    )?)
}

/// Soft-delete one version.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if it is not live.
pub fn soft_delete(conn: &Connection, id: VersionId) -> Result<()> {
    let changed = conn.execute(
        "UPDATE versions SET is_deleted = 1 WHERE version_id = ?1 AND is_deleted = 0",
        params![id],
    )?;
    if changed == 0 {
        return Err(MindmapError::not_found("version", id));
    }
    Ok(())
}

/// Soft-delete every live autosave beyond the `keep` newest. Returns how
/// many were pruned.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn prune_autosaves(conn: &Connection, document_id: DocumentId, keep: usize) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE versions SET is_deleted = 1 WHERE version_id IN ( \
             SELECT version_id FROM versions \
             WHERE document_id = ?1 AND version_type = 'autosave' AND is_deleted = 0 \
             ORDER BY version_number DESC LIMIT -1 OFFSET ?2 \
         )",
        params![document_id, sql_count(keep)],
    )?)
}
