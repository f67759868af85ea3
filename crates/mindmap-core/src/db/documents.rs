//! Document rows.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{MindmapError, Result};
use crate::model::{Document, DocumentId};

const DOCUMENT_COLUMNS: &str =
    "document_id, title, theme, visibility, metadata, created_at_us, updated_at_us";

fn map_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        theme: row.get(2)?,
        visibility: row.get(3)?,
        metadata: row.get(4)?,
        created_at_us: row.get(5)?,
        updated_at_us: row.get(6)?,
    })
}

/// Insert a new document row and return its id.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert(
    conn: &Connection,
    title: &str,
    theme: &str,
    visibility: &str,
    now_us: i64,
) -> Result<DocumentId> {
    conn.execute(
        "INSERT INTO documents (title, theme, visibility, created_at_us, updated_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![title, theme, visibility, now_us],
    )?;
    Ok(DocumentId(conn.last_insert_rowid()))
}

/// Fetch a live document.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_id(conn: &Connection, id: DocumentId) -> Result<Option<Document>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1 AND is_deleted = 0"
    );
    Ok(conn.query_row(&sql, params![id], map_document).optional()?)
}

/// Fetch a live document or fail with `NotFound`.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] when absent, or a database error.
pub fn require(conn: &Connection, id: DocumentId) -> Result<Document> {
    find_by_id(conn, id)?.ok_or_else(|| MindmapError::not_found("document", id))
}

/// List live documents, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection) -> Result<Vec<Document>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE is_deleted = 0 \
         ORDER BY created_at_us DESC, document_id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], map_document)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Persist the mutable fields of `doc`.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if the row is gone, or a database error.
pub fn save(conn: &Connection, doc: &Document) -> Result<()> {
    let changed = conn.execute(
        "UPDATE documents SET title = ?2, theme = ?3, visibility = ?4, metadata = ?5, \
         updated_at_us = ?6 WHERE document_id = ?1 AND is_deleted = 0",
        params![
            doc.id,
            doc.title,
            doc.theme,
            doc.visibility,
            doc.metadata,
            doc.updated_at_us
        ],
    )?;
    if changed == 0 {
        return Err(MindmapError::not_found("document", doc.id));
    }
    Ok(())
}

/// Logically delete a document and every node in it.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if the document is not live.
pub fn mark_deleted(conn: &Connection, id: DocumentId, now_us: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE documents SET is_deleted = 1, updated_at_us = ?2 \
         WHERE document_id = ?1 AND is_deleted = 0",
        params![id, now_us],
    )?;
    if changed == 0 {
        return Err(MindmapError::not_found("document", id));
    }
    super::nodes::mark_document_deleted(conn, id, now_us)
}
