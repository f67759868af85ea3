//! Node rows and sibling-rank bookkeeping.
//!
//! A node's position among its siblings is its `sibling_rank`; live siblings
//! hold the contiguous ranks `0..n`. `Node::children_order` is always derived
//! from those ranks on read, so there is no second copy of the order to keep
//! in sync.

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;

use crate::error::{MindmapError, Result};
use crate::model::{DocumentId, Node, NodeFields, NodeId};

const NODE_COLUMNS: &str = "node_id, document_id, parent_id, content, depth, collapsed, \
     color, icon, description, labels, metadata, position, created_at_us, updated_at_us";

fn map_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        document_id: row.get(1)?,
        parent_id: row.get(2)?,
        content: row.get(3)?,
        children_order: Vec::new(),
        depth: row.get(4)?,
        collapsed: row.get::<_, i64>(5)? != 0,
        color: row.get(6)?,
        icon: row.get(7)?,
        description: row.get(8)?,
        labels: row.get(9)?,
        metadata: row.get(10)?,
        position: row.get(11)?,
        created_at_us: row.get(12)?,
        updated_at_us: row.get(13)?,
    })
}

/// Placement of a node about to be inserted.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub document_id: DocumentId,
    pub parent_id: Option<NodeId>,
    pub rank: i64,
    pub depth: i64,
}

/// Insert a node row and return its id.
///
/// # Errors
///
/// Returns an error if the insert violates a constraint (for example a
/// second live root) or the database fails.
pub fn insert(
    conn: &Connection,
    placement: Placement,
    fields: &NodeFields,
    now_us: i64,
) -> Result<NodeId> {
    conn.execute(
        "INSERT INTO nodes (document_id, parent_id, sibling_rank, content, depth, collapsed, \
         color, icon, description, labels, metadata, position, created_at_us, updated_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            placement.document_id,
            placement.parent_id,
            placement.rank,
            fields.content,
            placement.depth,
            i64::from(fields.collapsed),
            fields.color,
            fields.icon,
            fields.description,
            fields.labels,
            fields.metadata,
            fields.position,
            now_us,
        ],
    )?;
    Ok(NodeId(conn.last_insert_rowid()))
}

/// Fetch a live node, including its ordered child ids.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_id(conn: &Connection, id: NodeId) -> Result<Option<Node>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE node_id = ?1 AND is_deleted = 0");
    let Some(mut node) = conn.query_row(&sql, params![id], map_node).optional()? else {
        return Ok(None);
    };
    node.children_order = child_ids(conn, id)?;
    Ok(Some(node))
}

/// Fetch a live node or fail with `NotFound`.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] when absent, or a database error.
pub fn require(conn: &Connection, id: NodeId) -> Result<Node> {
    find_by_id(conn, id)?.ok_or_else(|| MindmapError::not_found("node", id))
}

/// Live child ids of `parent` in sibling order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn child_ids(conn: &Connection, parent: NodeId) -> Result<Vec<NodeId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT node_id FROM nodes WHERE parent_id = ?1 AND is_deleted = 0 \
         ORDER BY sibling_rank, node_id",
    )?;
    let rows = stmt.query_map(params![parent], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<NodeId>>>()?)
}

/// Live children of `parent` in sibling order, each with its own child ids.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_children_of(conn: &Connection, parent: NodeId) -> Result<Vec<Node>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id = ?1 AND is_deleted = 0 \
         ORDER BY sibling_rank, node_id"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut children = stmt
        .query_map(params![parent], map_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for child in &mut children {
        child.children_order = child_ids(conn, child.id)?;
    }
    Ok(children)
}

/// All live nodes of a document, shallowest first and in sibling order within
/// each parent, with `children_order` filled in.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_all_in_document(conn: &Connection, document_id: DocumentId) -> Result<Vec<Node>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE document_id = ?1 AND is_deleted = 0 \
         ORDER BY depth, parent_id, sibling_rank, node_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut nodes = stmt
        .query_map(params![document_id], map_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in &nodes {
        if let Some(parent) = node.parent_id {
            children.entry(parent).or_default().push(node.id);
        }
    }
    for node in &mut nodes {
        node.children_order = children.remove(&node.id).unwrap_or_default();
    }
    Ok(nodes)
}

/// Live nodes whose depth lies in `from..=to`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_depth_range(
    conn: &Connection,
    document_id: DocumentId,
    from: i64,
    to: i64,
) -> Result<Vec<Node>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE document_id = ?1 AND is_deleted = 0 \
         AND depth BETWEEN ?2 AND ?3 ORDER BY depth, parent_id, sibling_rank, node_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut nodes = stmt
        .query_map(params![document_id, from, to], map_node)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for node in &mut nodes {
        node.children_order = child_ids(conn, node.id)?;
    }
    Ok(nodes)
}

/// The live root of a document, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_root(conn: &Connection, document_id: DocumentId) -> Result<Option<Node>> {
    let root_id: Option<NodeId> = conn
        .query_row(
            "SELECT node_id FROM nodes WHERE document_id = ?1 AND parent_id IS NULL \
             AND is_deleted = 0",
            params![document_id],
            |row| row.get(0),
        )
        .optional()?;
    match root_id {
        Some(id) => find_by_id(conn, id),
        None => Ok(None),
    }
}

/// Parent link of a live node: `None` if the node is missing or deleted,
/// `Some(None)` for a root.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn parent_of(conn: &Connection, id: NodeId) -> Result<Option<Option<NodeId>>> {
    let mut stmt =
        conn.prepare_cached("SELECT parent_id FROM nodes WHERE node_id = ?1 AND is_deleted = 0")?;
    Ok(stmt.query_row(params![id], |row| row.get(0)).optional()?)
}

/// Sibling rank of a live node.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if the node is not live.
pub fn rank_of(conn: &Connection, id: NodeId) -> Result<i64> {
    conn.query_row(
        "SELECT sibling_rank FROM nodes WHERE node_id = ?1 AND is_deleted = 0",
        params![id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| MindmapError::not_found("node", id))
}

/// Rank one past the last live child of `parent`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn next_rank(conn: &Connection, parent: NodeId) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(sibling_rank) + 1, 0) FROM nodes \
         WHERE parent_id = ?1 AND is_deleted = 0",
        params![parent],
        |row| row.get(0),
    )?)
}

/// `(parent, node, rank)` for every live non-root node of a document.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn sibling_ranks(
    conn: &Connection,
    document_id: DocumentId,
) -> Result<Vec<(NodeId, NodeId, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT parent_id, node_id, sibling_rank FROM nodes \
         WHERE document_id = ?1 AND is_deleted = 0 AND parent_id IS NOT NULL \
         ORDER BY parent_id, sibling_rank, node_id",
    )?;
    let rows = stmt.query_map(params![document_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Shift live siblings after `rank` one slot left, closing the hole a
/// departed child leaves behind.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn close_gap(conn: &Connection, parent: NodeId, rank: i64) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET sibling_rank = sibling_rank - 1 \
         WHERE parent_id = ?1 AND is_deleted = 0 AND sibling_rank > ?2",
        params![parent, rank],
    )?;
    Ok(())
}

/// Rewrite sibling ranks so that `ordered` is the child order of `parent`.
///
/// # Errors
///
/// Returns an error if an update fails.
pub fn set_ranks(conn: &Connection, parent: NodeId, ordered: &[NodeId], now_us: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE nodes SET sibling_rank = ?3, updated_at_us = ?4 \
         WHERE node_id = ?1 AND parent_id = ?2 AND is_deleted = 0",
    )?;
    for (rank, id) in (0_i64..).zip(ordered) {
        stmt.execute(params![id, parent, rank, now_us])?;
    }
    Ok(())
}

/// Re-link a node under `parent` at `rank` with a new `depth`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn attach(
    conn: &Connection,
    id: NodeId,
    parent: Option<NodeId>,
    rank: i64,
    depth: i64,
    now_us: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET parent_id = ?2, sibling_rank = ?3, depth = ?4, updated_at_us = ?5 \
         WHERE node_id = ?1 AND is_deleted = 0",
        params![id, parent, rank, depth, now_us],
    )?;
    Ok(())
}

/// Set the stored depth of one node.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_depth(conn: &Connection, id: NodeId, depth: i64) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE nodes SET depth = ?2 WHERE node_id = ?1")?;
    stmt.execute(params![id, depth])?;
    Ok(())
}

/// Persist the non-structural fields of `node` (content, style, flags).
///
/// Parent, depth and rank are only changed through the dedicated topology
/// functions.
///
/// # Errors
///
/// Returns [`MindmapError::NotFound`] if the node is not live.
pub fn save(conn: &Connection, node: &Node) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE nodes SET content = ?2, collapsed = ?3, color = ?4, icon = ?5, \
         description = ?6, labels = ?7, metadata = ?8, position = ?9, updated_at_us = ?10 \
         WHERE node_id = ?1 AND is_deleted = 0",
    )?;
    let changed = stmt.execute(params![
        node.id,
        node.content,
        i64::from(node.collapsed),
        node.color,
        node.icon,
        node.description,
        node.labels,
        node.metadata,
        node.position,
        node.updated_at_us,
    ])?;
    if changed == 0 {
        return Err(MindmapError::not_found("node", node.id));
    }
    Ok(())
}

/// [`save`] for a batch of nodes.
///
/// # Errors
///
/// Fails on the first node that is not live.
pub fn save_all(conn: &Connection, nodes: &[Node]) -> Result<()> {
    for node in nodes {
        save(conn, node)?;
    }
    Ok(())
}

/// Logically delete the given nodes. Returns how many rows changed.
///
/// # Errors
///
/// Returns an error if an update fails.
pub fn mark_deleted(conn: &Connection, ids: &[NodeId], now_us: i64) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE nodes SET is_deleted = 1, deleted_at_us = ?2, updated_at_us = ?2 \
         WHERE node_id = ?1 AND is_deleted = 0",
    )?;
    let mut changed = 0;
    for id in ids {
        changed += stmt.execute(params![id, now_us])?;
    }
    Ok(changed)
}

/// Logically delete every live node of a document.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn mark_document_deleted(
    conn: &Connection,
    document_id: DocumentId,
    now_us: i64,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE nodes SET is_deleted = 1, deleted_at_us = ?2, updated_at_us = ?2 \
         WHERE document_id = ?1 AND is_deleted = 0",
        params![document_id, now_us],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{documents, open_in_memory};

    fn setup() -> (Connection, DocumentId, NodeId) {
        let conn = open_in_memory().expect("open");
        let doc = documents::insert(&conn, "Doc", "default", "private", 1).expect("doc");
        let root = insert(
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
        (conn, doc, root)
    }

    fn add_child(conn: &Connection, doc: DocumentId, parent: NodeId, content: &str) -> NodeId {
        let rank = next_rank(conn, parent).expect("rank");
        insert(
            conn,
            Placement {
                document_id: doc,
                parent_id: Some(parent),
                rank,
                depth: 1,
            },
            &NodeFields::with_content(content),
            2,
        )
        .expect("child")
    }

    #[test]
    fn children_come_back_in_rank_order() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        let b = add_child(&conn, doc, root, "b");
        let c = add_child(&conn, doc, root, "c");

        assert_eq!(child_ids(&conn, root).expect("ids"), vec![a, b, c]);
        let node = require(&conn, root).expect("root");
        assert_eq!(node.children_order, vec![a, b, c]);
    }

    #[test]
    fn closing_a_gap_keeps_ranks_contiguous() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        let b = add_child(&conn, doc, root, "b");
        let c = add_child(&conn, doc, root, "c");

        let rank_a = rank_of(&conn, a).expect("rank");
        mark_deleted(&conn, &[a], 4).expect("delete");
        close_gap(&conn, root, rank_a).expect("close gap");
        assert_eq!(rank_of(&conn, b).expect("rank"), 0);
        assert_eq!(child_ids(&conn, root).expect("ids"), vec![b, c]);

        let ranks = sibling_ranks(&conn, doc).expect("ranks");
        assert_eq!(ranks, vec![(root, b, 0), (root, c, 1)]);
    }

    #[test]
    fn find_all_fills_children_order() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        let b = add_child(&conn, doc, root, "b");
        set_ranks(&conn, root, &[b, a], 5).expect("reorder");

        let all = find_all_in_document(&conn, doc).expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, root);
        assert_eq!(all[0].children_order, vec![b, a]);
    }

    #[test]
    fn root_lookup_and_parent_links() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        assert_eq!(find_root(&conn, doc).expect("root").map(|n| n.id), Some(root));
        assert_eq!(parent_of(&conn, a).expect("parent"), Some(Some(root)));
        assert_eq!(parent_of(&conn, root).expect("parent"), Some(None));
        assert_eq!(parent_of(&conn, NodeId(999)).expect("parent"), None);
    }

    #[test]
    fn save_updates_fields_but_not_topology() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        let mut node = require(&conn, a).expect("a");
        node.content = "renamed".into();
        node.color = Some("#f00".into());
        node.depth = 7;
        node.parent_id = None;
        save(&conn, &node).expect("save");

        let back = require(&conn, a).expect("a");
        assert_eq!(back.content, "renamed");
        assert_eq!(back.color.as_deref(), Some("#f00"));
        assert_eq!(back.depth, 1);
        assert_eq!(back.parent_id, Some(root));
    }

    #[test]
    fn save_of_deleted_node_is_not_found() {
        let (conn, doc, root) = setup();
        let a = add_child(&conn, doc, root, "a");
        let node = require(&conn, a).expect("a");
        mark_deleted(&conn, &[a], 9).expect("delete");
        assert!(matches!(save(&conn, &node), Err(MindmapError::NotFound { .. })));
        assert!(child_ids(&conn, root).expect("children").is_empty());
    }
}
