//! `mm node`: structural and field edits on single nodes.

use super::{EditArgs, Session};
use crate::output::{pretty_kv, pretty_section, render};
use anyhow::Context;
use clap::{Args, Subcommand};
use mindmap_core::model::{DocumentId, Node, NodeFields, NodeId, NodePatch};
use serde_json::json;
use std::io::{self, Write};

/// Field flags shared by `add` and `update`.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    #[arg(long)]
    pub color: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Free-form label string.
    #[arg(long)]
    pub labels: Option<String>,

    /// Opaque layout position (e.g. `"x,y"`).
    #[arg(long)]
    pub position: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Add a node under `--parent`, or as the root of an empty document.
    Add {
        doc: DocumentId,
        content: String,

        #[arg(long)]
        parent: Option<NodeId>,

        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        edit: EditArgs,
    },

    Show { id: NodeId },

    /// Children in sibling order.
    Children { id: NodeId },

    /// Ancestors, nearest first.
    Ancestors { id: NodeId },

    /// Move a node (and its subtree) under a new parent.
    Move {
        id: NodeId,

        /// New parent id, or `none` to stay a root.
        #[arg(long)]
        parent: String,

        /// Position among the new siblings; appended when omitted.
        #[arg(long)]
        index: Option<usize>,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Delete a node and its subtree.
    Delete {
        id: NodeId,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Change content or style fields.
    Update {
        id: NodeId,

        #[arg(long)]
        content: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Apply the same field changes to several nodes of one document.
    BatchUpdate {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<NodeId>,

        #[arg(long)]
        content: Option<String>,

        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Replace the order of a node's children.
    Reorder {
        parent: NodeId,

        /// Every child id, in the new order.
        #[arg(required = true, num_args = 1..)]
        order: Vec<NodeId>,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Flip the collapsed flag.
    Collapse {
        id: NodeId,

        #[command(flatten)]
        edit: EditArgs,
    },
}

fn parse_parent(raw: &str) -> anyhow::Result<Option<NodeId>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .with_context(|| format!("invalid parent id '{raw}'"))
}

fn patch(content: Option<&str>, fields: &FieldArgs) -> NodePatch {
    NodePatch {
        content: content.map(str::to_string),
        color: fields.color.clone(),
        icon: fields.icon.clone(),
        description: fields.description.clone(),
        labels: fields.labels.clone(),
        metadata: None,
        position: fields.position.clone(),
    }
}

/// One-line summary used by list-style output.
pub fn write_node_line(w: &mut dyn Write, node: &Node) -> io::Result<()> {
    let marker = if node.collapsed { '+' } else { '-' };
    writeln!(
        w,
        "{:indent$}{marker} [{}] {}",
        "",
        node.id,
        node.content,
        indent = usize::try_from(node.depth).unwrap_or(0) * 2
    )
}

fn write_node(w: &mut dyn Write, node: &Node) -> io::Result<()> {
    pretty_section(w, &node.content)?;
    pretty_kv(w, "id", node.id.to_string())?;
    pretty_kv(w, "document", node.document_id.to_string())?;
    pretty_kv(
        w,
        "parent",
        node.parent_id.map_or_else(|| "(root)".to_string(), |p| p.to_string()),
    )?;
    pretty_kv(w, "depth", node.depth.to_string())?;
    pretty_kv(w, "children", node.children_order.len().to_string())?;
    if node.collapsed {
        pretty_kv(w, "collapsed", "yes")?;
    }
    for (key, value) in [
        ("color", &node.color),
        ("icon", &node.icon),
        ("description", &node.description),
        ("labels", &node.labels),
        ("position", &node.position),
    ] {
        if let Some(value) = value {
            pretty_kv(w, key, value)?;
        }
    }
    Ok(())
}

fn render_node(session: &Session<'_>, node: &Node) -> anyhow::Result<()> {
    render(session.output, node, |node, w| write_node(w, node))
}

fn render_nodes(session: &Session<'_>, nodes: &[Node]) -> anyhow::Result<()> {
    render(session.output, &nodes, |nodes, w| {
        for node in *nodes {
            write_node_line(w, node)?;
        }
        Ok(())
    })
}

pub fn run_node(cmd: &NodeCommand, session: &Session<'_>) -> anyhow::Result<()> {
    let tree = session.mm.tree();
    let user = session.user;
    match cmd {
        NodeCommand::Add {
            doc,
            content,
            parent,
            fields,
            edit,
        } => {
            let new = NodeFields {
                content: content.clone(),
                color: fields.color.clone(),
                icon: fields.icon.clone(),
                description: fields.description.clone(),
                labels: fields.labels.clone(),
                metadata: None,
                position: fields.position.clone(),
                collapsed: false,
            };
            let node = tree
                .create_node(&edit.context(user), *doc, *parent, &new)
                .context("add node")?;
            render_node(session, &node)
        }
        NodeCommand::Show { id } => render_node(session, &tree.get_node(*id)?),
        NodeCommand::Children { id } => render_nodes(session, &tree.get_children(*id)?),
        NodeCommand::Ancestors { id } => render_nodes(session, &tree.get_ancestors(*id)?),
        NodeCommand::Move {
            id,
            parent,
            index,
            edit,
        } => {
            let parent = parse_parent(parent)?;
            let node = tree
                .move_node(&edit.context(user), *id, parent, *index)
                .with_context(|| format!("move node {id}"))?;
            render_node(session, &node)
        }
        NodeCommand::Delete { id, edit } => {
            let deleted = tree
                .delete_node(&edit.context(user), *id)
                .with_context(|| format!("delete node {id}"))?;
            let value = json!({ "nodeId": id, "deleted": deleted });
            render(session.output, &value, |_, w| {
                writeln!(w, "deleted {deleted} node(s) under {id}")
            })
        }
        NodeCommand::Update {
            id,
            content,
            fields,
            edit,
        } => {
            let node = tree
                .update_node(&edit.context(user), *id, &patch(content.as_deref(), fields))
                .with_context(|| format!("update node {id}"))?;
            render_node(session, &node)
        }
        NodeCommand::BatchUpdate {
            ids,
            content,
            fields,
            edit,
        } => {
            let nodes = tree
                .batch_update_nodes(&edit.context(user), ids, &patch(content.as_deref(), fields))
                .context("batch update")?;
            render_nodes(session, &nodes)
        }
        NodeCommand::Reorder {
            parent,
            order,
            edit,
        } => {
            let order = tree
                .reorder_children(&edit.context(user), *parent, order)
                .with_context(|| format!("reorder children of {parent}"))?;
            let value = json!({ "parentId": parent, "childrenOrder": order });
            render(session.output, &value, |_, w| {
                let ids: Vec<String> = order.iter().map(ToString::to_string).collect();
                writeln!(w, "{parent}: {}", ids.join(" "))
            })
        }
        NodeCommand::Collapse { id, edit } => {
            let node = tree
                .toggle_collapse(&edit.context(user), *id)
                .with_context(|| format!("toggle node {id}"))?;
            render_node(session, &node)
        }
    }
}
