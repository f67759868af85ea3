//! Output layer shared by every command: pretty text for humans, stable
//! JSON for scripts.
//!
//! Mode precedence (highest wins): `--json`, then `MINDMAP_FORMAT`
//! (`pretty` | `json`), then pretty.

use mindmap_core::error::MindmapError;
use serde::Serialize;
use std::io::{self, Write};

/// Width of the rule printed under pretty section headings.
pub const PRETTY_RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Json,
}

fn resolve_output_mode_inner(json_flag: bool, format_env: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match format_env.map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Pretty,
    }
}

/// Resolve the output mode from the `--json` flag and the environment.
pub fn resolve_output_mode(json_flag: bool) -> OutputMode {
    let env_val = std::env::var("MINDMAP_FORMAT").ok();
    resolve_output_mode_inner(json_flag, env_val.as_deref())
}

pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Left-aligned key/value line.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// Render `value` as pretty JSON, or through `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A failure as shown to the user, with the library's stable code when the
/// cause is a [`MindmapError`].
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CliError {
    /// Build from any error chain, picking up the code of the first
    /// [`MindmapError`] in it.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        match err.chain().find_map(|cause| cause.downcast_ref::<MindmapError>()) {
            Some(cause) => Self {
                message,
                error_code: Some(cause.code().code().to_string()),
                suggestion: cause.hint().map(str::to_string),
            },
            None => Self {
                message,
                error_code: None,
                suggestion: None,
            },
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
            writeln!(out)?;
        }
        OutputMode::Pretty => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}
