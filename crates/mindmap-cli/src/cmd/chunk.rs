//! `mm chunk`: bounded reads for incremental rendering.

use super::Session;
use super::node::write_node_line;
use crate::output::{pretty_kv, render};
use clap::Subcommand;
use mindmap_core::chunk::Chunk;
use mindmap_core::model::{DocumentId, NodeId};
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum ChunkCommand {
    /// The chunk hanging from the document root.
    Root { doc: DocumentId },

    /// The chunk hanging from one node.
    Subtree { doc: DocumentId, node: NodeId },

    /// Every node with depth in `FROM..=TO`.
    Levels { doc: DocumentId, from: i64, to: i64 },
}

fn write_chunk(w: &mut dyn Write, chunk: &Chunk) -> io::Result<()> {
    write_node_line(w, &chunk.root_node)?;
    for node in &chunk.child_nodes {
        write_node_line(w, node)?;
    }
    writeln!(w)?;
    pretty_kv(w, "chunk", &chunk.chunk_key)?;
    pretty_kv(w, "nodes", chunk.node_count.to_string())?;
    pretty_kv(w, "max depth", chunk.max_depth.to_string())?;
    if chunk.has_more {
        let ids: Vec<String> = chunk.frontier.iter().map(ToString::to_string).collect();
        pretty_kv(w, "more below", ids.join(" "))?;
    }
    Ok(())
}

pub fn run_chunk(cmd: &ChunkCommand, session: &Session<'_>) -> anyhow::Result<()> {
    let chunks = session.mm.chunks();
    match cmd {
        ChunkCommand::Root { doc } => {
            let chunk = chunks.get_root_chunk(*doc)?;
            render(session.output, chunk.as_ref(), |c, w| write_chunk(w, c))
        }
        ChunkCommand::Subtree { doc, node } => {
            let chunk = chunks.get_subtree_chunk(*doc, *node)?;
            render(session.output, chunk.as_ref(), |c, w| write_chunk(w, c))
        }
        ChunkCommand::Levels { doc, from, to } => {
            let nodes = chunks.load_nodes_by_level(*doc, *from, *to)?;
            render(session.output, &nodes, |nodes, w| {
                for node in nodes {
                    write_node_line(w, node)?;
                }
                Ok(())
            })
        }
    }
}
