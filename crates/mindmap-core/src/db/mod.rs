//! SQLite storage for documents, nodes, operations and versions.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so chunk readers never wait on a writer
//! - `busy_timeout = 5s` so contending writers queue instead of failing
//! - `foreign_keys = ON` to protect document/node references
//!
//! Each submodule exposes the persistence primitives for one entity
//! (`find_by_id`, `find_children_of`, `find_all_in_document`, `save`,
//! `save_all`, ...). They take a plain `&Connection` so they compose inside
//! an enclosing [`immediate`] transaction.

pub mod documents;
pub mod migrations;
pub mod nodes;
pub mod operations;
pub mod schema;
pub mod versions;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};

use crate::error::{MindmapError, Result};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MindmapError::Config(format!(
                    "create store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let mut conn = Connection::open(path)?;
    configure_connection(&conn)?;
    migrations::migrate(&mut conn)?;
    tracing::debug!(path = %path.display(), "opened mindmap store");

    Ok(conn)
}

/// Open a private in-memory store. Used by tests and throwaway tooling.
///
/// # Errors
///
/// Returns an error if SQLite cannot allocate or migrate the database.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    migrations::migrate(&mut conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

/// Begin a write transaction that takes the database write lock up front.
///
/// Every mutation runs inside one of these, which serializes writers and
/// keeps multi-row edits (moves, restores) invisible until commit.
///
/// # Errors
///
/// Returns an error if the lock cannot be taken within the busy timeout.
pub fn immediate(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

/// Convert a `usize` count into the `i64` SQLite expects.
pub(crate) fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
