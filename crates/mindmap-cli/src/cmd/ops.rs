//! `mm ops`: inspect and maintain the operation log.

use super::Session;
use crate::output::render;
use anyhow::Context;
use clap::Subcommand;
use mindmap_core::model::{DocumentId, NewOperation, NodeId, OpType, Operation};
use mindmap_core::oplog::generate_op_id;
use serde_json::json;
use std::io::{self, Write};

#[derive(Subcommand, Debug)]
pub enum OpsCommand {
    /// Operations in creation order, optionally within a time range (µs).
    List {
        doc: DocumentId,

        #[arg(long, requires = "until")]
        since: Option<i64>,

        #[arg(long, requires = "since")]
        until: Option<i64>,
    },

    /// Most recent operations, newest first.
    Recent {
        doc: DocumentId,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Operations in causality order for `FROM..=TO`.
    Replay { doc: DocumentId, from: i64, to: i64 },

    /// Record an operation submitted by an external client.
    Record {
        doc: DocumentId,

        /// create, update, batch_update, move, reorder, delete, collapse or restore.
        op_type: OpType,

        #[arg(long)]
        node: Option<NodeId>,

        /// JSON payload.
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Idempotency key; a fresh one is generated when omitted.
        #[arg(long)]
        op_id: Option<String>,

        /// Causality timestamp (µs).
        #[arg(long)]
        at: Option<i64>,
    },

    /// Drop operations past the retention window.
    Cleanup { doc: DocumentId },
}

fn write_ops(w: &mut dyn Write, ops: &[Operation]) -> io::Result<()> {
    for op in ops {
        let node = op.node_id.map_or_else(|| "-".to_string(), |n| n.to_string());
        writeln!(
            w,
            "{:>16}  {:<12} {:>6}  user {}  {}",
            op.causality_ts, op.op_type, node, op.user_id, op.op_id
        )?;
    }
    Ok(())
}

pub fn run_ops(cmd: &OpsCommand, session: &Session<'_>) -> anyhow::Result<()> {
    let log = session.mm.oplog();
    match cmd {
        OpsCommand::List { doc, since, until } => {
            let range = since.zip(*until);
            let ops = log.get_operations(*doc, range)?;
            render(session.output, &ops, |ops, w| write_ops(w, ops))
        }
        OpsCommand::Recent { doc, limit } => {
            let ops = log.get_recent_operations(*doc, *limit)?;
            render(session.output, &ops, |ops, w| write_ops(w, ops))
        }
        OpsCommand::Replay { doc, from, to } => {
            let ops = log.get_operations_for_replay(*doc, *from, *to)?;
            render(session.output, &ops, |ops, w| write_ops(w, ops))
        }
        OpsCommand::Record {
            doc,
            op_type,
            node,
            payload,
            op_id,
            at,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(payload).context("payload is not valid JSON")?;
            let op_id = op_id
                .clone()
                .unwrap_or_else(|| generate_op_id(*doc, *op_type, *node, &payload));
            let op = log
                .record_operation(&NewOperation {
                    op_id,
                    document_id: *doc,
                    op_type: *op_type,
                    node_id: *node,
                    payload,
                    user_id: session.user,
                    causality_ts: *at,
                })
                .context("record operation")?;
            render(session.output, &op, |op, w| writeln!(w, "recorded {}", op.op_id))
        }
        OpsCommand::Cleanup { doc } => {
            let deleted = log.cleanup_old_operations(*doc)?;
            let value = json!({ "documentId": doc, "deleted": deleted });
            render(session.output, &value, |_, w| {
                writeln!(w, "pruned {deleted} operation(s)")
            })
        }
    }
}
