//! Canonical SQLite schema for mind-map storage.
//!
//! - `documents` holds per-document metadata; the root node is derived, not
//!   stored here
//! - `nodes` keeps one row per node; child order lives in `sibling_rank` only
//! - `operations` is the append-only edit log, unique on `op_id`
//! - `versions` holds immutable snapshots, unique on
//!   `(document_id, version_number)`
//! - `store_meta` tracks the schema version for diagnostics

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    document_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    theme TEXT NOT NULL DEFAULT 'default',
    visibility TEXT NOT NULL DEFAULT 'private',
    metadata TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    node_id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(document_id),
    parent_id INTEGER REFERENCES nodes(node_id),
    sibling_rank INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0 CHECK (depth >= 0),
    collapsed INTEGER NOT NULL DEFAULT 0 CHECK (collapsed IN (0, 1)),
    color TEXT,
    icon TEXT,
    description TEXT,
    labels TEXT,
    metadata TEXT,
    position TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK (parent_id IS NULL OR parent_id <> node_id)
);

CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    op_id TEXT NOT NULL UNIQUE CHECK (length(trim(op_id)) > 0),
    document_id INTEGER NOT NULL REFERENCES documents(document_id),
    node_id INTEGER,
    op_type TEXT NOT NULL CHECK (op_type IN (
        'create', 'update', 'batch_update', 'move',
        'reorder', 'delete', 'collapse', 'restore'
    )),
    payload TEXT NOT NULL DEFAULT '{}',
    user_id INTEGER NOT NULL,
    causality_ts INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(document_id),
    version_number INTEGER NOT NULL CHECK (version_number > 0),
    version_type TEXT NOT NULL CHECK (version_type IN ('autosave', 'explicit')),
    name TEXT NOT NULL,
    description TEXT,
    snapshot_data TEXT NOT NULL,
    node_count INTEGER NOT NULL,
    snapshot_size INTEGER NOT NULL,
    created_by INTEGER,
    is_deleted INTEGER NOT NULL DEFAULT 0 CHECK (is_deleted IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    UNIQUE (document_id, version_number)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes and the single-live-root guard.
pub const MIGRATION_V2_SQL: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_single_live_root
    ON nodes(document_id)
    WHERE parent_id IS NULL AND is_deleted = 0;

CREATE INDEX IF NOT EXISTS idx_nodes_parent_rank
    ON nodes(parent_id, is_deleted, sibling_rank);

CREATE INDEX IF NOT EXISTS idx_nodes_document_live
    ON nodes(document_id, is_deleted, depth);

CREATE INDEX IF NOT EXISTS idx_operations_document_created
    ON operations(document_id, created_at_us, id);

CREATE INDEX IF NOT EXISTS idx_operations_document_causality
    ON operations(document_id, causality_ts, created_at_us, id);

CREATE INDEX IF NOT EXISTS idx_versions_document_type
    ON versions(document_id, version_type, is_deleted, version_number DESC);
";

/// Indexes the read and write paths rely on.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_nodes_single_live_root",
    "idx_nodes_parent_rank",
    "idx_nodes_document_live",
    "idx_operations_document_created",
    "idx_operations_document_causality",
    "idx_versions_document_type",
];
