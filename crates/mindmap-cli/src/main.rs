#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cmd::Session;
use mindmap_core::MindMap;
use output::{CliError, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DB_FILE_NAME: &str = "maps.sqlite3";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mm: versioned mind-map trees",
    long_about = None
)]
struct Cli {
    /// Store database (default: MINDMAP_DB, then the user data directory).
    #[arg(long, global = true, env = "MINDMAP_DB")]
    db: Option<PathBuf>,

    /// Acting user id recorded in the operation log.
    #[arg(long, global = true, env = "MINDMAP_USER", default_value_t = 0)]
    user: i64,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Manage documents",
        after_help = "EXAMPLES:\n    mm doc create \"Roadmap\"\n    mm doc list --json"
    )]
    Doc {
        #[command(subcommand)]
        command: cmd::doc::DocCommand,
    },

    #[command(
        about = "Edit and inspect nodes",
        after_help = "EXAMPLES:\n    mm node add 1 \"Research\" --parent 1\n    mm node move 4 --parent 2 --index 0\n    mm node update 4 --color \"#ff0000\" --op-id client-17"
    )]
    Node {
        #[command(subcommand)]
        command: cmd::node::NodeCommand,
    },

    #[command(
        about = "Save, list and restore versions",
        after_help = "EXAMPLES:\n    mm version save 1 --name \"Before review\"\n    mm version restore 3"
    )]
    Version {
        #[command(subcommand)]
        command: cmd::version::VersionCommand,
    },

    #[command(
        about = "Compare versions",
        after_help = "EXAMPLES:\n    # Two stored versions\n    mm diff 2 5\n\n    # A version against the live tree\n    mm diff 2"
    )]
    Diff(cmd::diff::DiffArgs),

    #[command(about = "Read bounded chunks of a tree")]
    Chunk {
        #[command(subcommand)]
        command: cmd::chunk::ChunkCommand,
    },

    #[command(about = "Inspect and maintain the operation log")]
    Ops {
        #[command(subcommand)]
        command: cmd::ops::OpsCommand,
    },

    #[command(about = "Check the structural integrity of a document")]
    Check(cmd::check::CheckArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MINDMAP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "mindmap=debug,info"
        } else {
            "mindmap=info,warn"
        })
    });

    let format = env::var("MINDMAP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// `--db`/`MINDMAP_DB`, else `<data dir>/mindmap/maps.sqlite3`, else
/// `./.mindmap/maps.sqlite3`.
fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| {
        dirs::data_dir().map_or_else(
            || PathBuf::from(".mindmap").join(DB_FILE_NAME),
            |dir| dir.join("mindmap").join(DB_FILE_NAME),
        )
    })
}

fn run(cli: Cli, output: output::OutputMode) -> anyhow::Result<()> {
    let path = resolve_db_path(cli.db);
    let mm = MindMap::open(&path).with_context(|| format!("open store {}", path.display()))?;
    tracing::debug!(path = %path.display(), user = cli.user, "store ready");
    let session = Session {
        mm: &mm,
        user: cli.user,
        output,
    };

    match &cli.command {
        Commands::Doc { command } => cmd::doc::run_doc(command, &session),
        Commands::Node { command } => cmd::node::run_node(command, &session),
        Commands::Version { command } => cmd::version::run_version(command, &session),
        Commands::Diff(args) => cmd::diff::run_diff(args, &session),
        Commands::Chunk { command } => cmd::chunk::run_chunk(command, &session),
        Commands::Ops { command } => cmd::ops::run_ops(command, &session),
        Commands::Check(args) => cmd::check::run_check(args, &session),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let output = resolve_output_mode(cli.json);

    match run(cli, output) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            render_error(output, &CliError::from_anyhow(&err))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["mm", "doc", "list", "--json", "--db", "x.sqlite3"]);
        assert!(cli.json);
        assert_eq!(cli.db, Some(PathBuf::from("x.sqlite3")));
        assert!(matches!(
            cli.command,
            Commands::Doc {
                command: cmd::doc::DocCommand::List
            }
        ));
    }

    #[test]
    fn move_accepts_index_and_op_id() {
        let cli = Cli::parse_from([
            "mm", "node", "move", "4", "--parent", "2", "--index", "0", "--op-id", "k1",
        ]);
        let Commands::Node {
            command:
                cmd::node::NodeCommand::Move {
                    id,
                    parent,
                    index,
                    edit,
                },
        } = cli.command
        else {
            panic!("expected node move");
        };
        assert_eq!(id.0, 4);
        assert_eq!(parent, "2");
        assert_eq!(index, Some(0));
        assert_eq!(edit.op_id.as_deref(), Some("k1"));
    }

    #[test]
    fn diff_target_is_optional() {
        let cli = Cli::parse_from(["mm", "diff", "3"]);
        let Commands::Diff(args) = cli.command else {
            panic!("expected diff");
        };
        assert_eq!(args.from.0, 3);
        assert!(args.to.is_none());
    }

    #[test]
    fn version_type_filter_parses() {
        let cli = Cli::parse_from(["mm", "version", "list", "1", "--type", "autosave"]);
        assert!(matches!(
            cli.command,
            Commands::Version {
                command: cmd::version::VersionCommand::List {
                    version_type: Some(mindmap_core::model::VersionType::Autosave),
                    ..
                }
            }
        ));
    }

    #[test]
    fn explicit_db_path_wins() {
        let path = PathBuf::from("/tmp/custom.sqlite3");
        assert_eq!(resolve_db_path(Some(path.clone())), path);
        assert!(resolve_db_path(None).ends_with(DB_FILE_NAME));
    }
}
