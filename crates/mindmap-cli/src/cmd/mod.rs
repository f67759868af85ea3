pub mod check;
pub mod chunk;
pub mod diff;
pub mod doc;
pub mod node;
pub mod ops;
pub mod version;

use crate::output::OutputMode;
use clap::Args;
use mindmap_core::MindMap;
use mindmap_core::tree::EditContext;

/// What every handler needs: the open store, who is acting, and how to
/// print.
pub struct Session<'a> {
    pub mm: &'a MindMap,
    pub user: i64,
    pub output: OutputMode,
}

/// Options shared by every command that edits the tree.
#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Idempotency key. Repeating a key replays the first result.
    #[arg(long)]
    pub op_id: Option<String>,

    /// Causality timestamp (microseconds) used to order replays.
    #[arg(long)]
    pub at: Option<i64>,
}

impl EditArgs {
    pub fn context(&self, user: i64) -> EditContext {
        let mut ctx = EditContext::user(user);
        if let Some(op_id) = &self.op_id {
            ctx = ctx.with_op_id(op_id.clone());
        }
        if let Some(ts) = self.at {
            ctx = ctx.at(ts);
        }
        ctx
    }
}
