//! Tunable limits for tree walks, chunk reads, and retention.
//!
//! Every field has a serde default, so a partial (or absent) `mindmap.toml`
//! yields the stock limits.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MindmapError, Result};

/// File name looked up next to the database.
pub const CONFIG_FILE_NAME: &str = "mindmap.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub chunks: ChunkConfig,
    #[serde(default)]
    pub versions: VersionConfig,
    #[serde(default)]
    pub operations: OperationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Hop cap for ancestor walks; exceeding it means the parent links are
    /// corrupt.
    #[serde(default = "default_max_ancestor_hops")]
    pub max_ancestor_hops: usize,
    /// Deepest depth a node may be created or moved to.
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_ancestor_hops: default_max_ancestor_hops(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum nodes per chunk, chunk root included.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum depth below the chunk root.
    #[serde(default = "default_max_depth_per_chunk")]
    pub max_depth_per_chunk: i64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl ChunkConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_depth_per_chunk: default_max_depth_per_chunk(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Autosave versions kept after each autosave.
    #[serde(default = "default_autosave_keep")]
    pub autosave_keep: usize,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            autosave_keep: default_autosave_keep(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Operations older than this are pruning candidates.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Most recent operations per document that are never pruned.
    #[serde(default = "default_retention_floor")]
    pub retention_floor: usize,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            retention_floor: default_retention_floor(),
        }
    }
}

const fn default_max_ancestor_hops() -> usize {
    100
}

const fn default_max_depth() -> i64 {
    100
}

const fn default_chunk_size() -> usize {
    100
}

const fn default_max_depth_per_chunk() -> i64 {
    3
}

const fn default_ttl_secs() -> u64 {
    300
}

const fn default_autosave_keep() -> usize {
    10
}

const fn default_retention_days() -> i64 {
    30
}

const fn default_retention_floor() -> usize {
    1000
}

/// Upper bound for `tree.max_ancestor_hops`.
pub const MAX_ANCESTOR_HOPS_LIMIT: usize = 1_000;

impl Config {
    /// Check the limits against each other.
    ///
    /// Every live node must be walkable to the root, so `max_depth` may not
    /// exceed `max_ancestor_hops`.
    ///
    /// # Errors
    ///
    /// Returns [`MindmapError::Config`] naming the first bad limit.
    pub fn validate(&self) -> Result<()> {
        let tree = &self.tree;
        if tree.max_ancestor_hops == 0 || tree.max_ancestor_hops > MAX_ANCESTOR_HOPS_LIMIT {
            return Err(MindmapError::Config(format!(
                "tree.max_ancestor_hops must be in 1..={MAX_ANCESTOR_HOPS_LIMIT}, got {}",
                tree.max_ancestor_hops
            )));
        }
        let hops = i64::try_from(tree.max_ancestor_hops).unwrap_or(i64::MAX);
        if tree.max_depth < 0 || tree.max_depth > hops {
            return Err(MindmapError::Config(format!(
                "tree.max_depth must be in 0..={hops} (tree.max_ancestor_hops), got {}",
                tree.max_depth
            )));
        }
        if self.chunks.chunk_size == 0 || self.chunks.max_depth_per_chunk < 0 {
            return Err(MindmapError::Config(
                "chunks.chunk_size must be positive and chunks.max_depth_per_chunk non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a config from TOML text.
///
/// # Errors
///
/// Returns [`MindmapError::Config`] if the text is not valid TOML, a field
/// has the wrong type, or the limits fail [`Config::validate`].
pub fn parse_config(content: &str) -> Result<Config> {
    let config =
        toml::from_str::<Config>(content).map_err(|e| MindmapError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load `mindmap.toml` from `dir`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns [`MindmapError::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_config(dir: &Path) -> Result<Config> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| MindmapError::Config(format!("failed to read {}: {e}", path.display())))?;

    parse_config(&content).map_err(|e| match e {
        MindmapError::Config(msg) => {
            MindmapError::Config(format!("failed to parse {}: {msg}", path.display()))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.tree.max_ancestor_hops, 100);
        assert_eq!(config.chunks.chunk_size, 100);
        assert_eq!(config.chunks.max_depth_per_chunk, 3);
        assert_eq!(config.chunks.ttl(), Duration::from_secs(300));
        assert_eq!(config.versions.autosave_keep, 10);
        assert_eq!(config.operations.retention_days, 30);
        assert_eq!(config.operations.retention_floor, 1000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = parse_config("[chunks]\nchunk_size = 25\n").expect("parse");
        assert_eq!(config.chunks.chunk_size, 25);
        assert_eq!(config.chunks.max_depth_per_chunk, 3);
        assert_eq!(config.versions.autosave_keep, 10);
    }

    #[test]
    fn bad_type_is_config_error() {
        let err = parse_config("[versions]\nautosave_keep = \"ten\"\n").expect_err("should fail");
        assert!(matches!(err, MindmapError::Config(_)));
    }

    #[test]
    fn depth_beyond_hop_cap_is_rejected() {
        let err = parse_config("[tree]\nmax_depth = 150\n").expect_err("deeper than hop cap");
        assert!(matches!(err, MindmapError::Config(ref msg) if msg.contains("max_depth")));

        let config = parse_config("[tree]\nmax_depth = 150\nmax_ancestor_hops = 150\n")
            .expect("raised together");
        assert_eq!(config.tree.max_depth, 150);
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_limits_are_rejected() {
        for text in [
            "[tree]\nmax_ancestor_hops = 0\nmax_depth = 0\n",
            "[tree]\nmax_ancestor_hops = 2000\n",
            "[tree]\nmax_depth = -1\n",
            "[chunks]\nchunk_size = 0\n",
        ] {
            assert!(
                matches!(parse_config(text), Err(MindmapError::Config(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn bad_limits_in_file_fail_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[tree]\nmax_depth = 150\n")
            .expect("write config");
        let err = load_config(dir.path()).expect_err("invalid limits");
        assert!(matches!(err, MindmapError::Config(ref msg) if msg.contains(CONFIG_FILE_NAME)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_on_disk_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[operations]\nretention_floor = 5\n",
        )
        .expect("write config");
        let config = load_config(dir.path()).expect("load");
        assert_eq!(config.operations.retention_floor, 5);
    }
}
