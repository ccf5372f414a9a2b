//! quizscore configuration.
//!
//! Loaded from `quizscore.toml`, with environment variable overrides. Every
//! field has a default, so an absent config file is not an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineConfig, ScoringOptions};
use crate::rules::Limits;

/// Top-level quizscore configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizscoreConfig {
    /// Bounds on admin-authored rule payloads.
    #[serde(default)]
    pub limits: Limits,
    /// Answer-set policies.
    #[serde(default)]
    pub scoring: ScoringOptions,
    /// Max concurrent submissions in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for batch reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory for persisted scoring records, if any.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./quizscore-results")
}

impl Default for QuizscoreConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            scoring: ScoringOptions::default(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            store_dir: None,
        }
    }
}

impl QuizscoreConfig {
    /// Engine configuration derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            limits: self.limits,
            options: self.scoring,
            parallelism: self.parallelism,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizscore.toml` in the current directory
/// 2. `~/.config/quizscore/config.toml`
///
/// Environment variable overrides: `QUIZSCORE_STORE_DIR`, `QUIZSCORE_PARALLELISM`.
pub fn load_config() -> Result<QuizscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizscore.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => QuizscoreConfig::default(),
    };

    if let Ok(dir) = std::env::var("QUIZSCORE_STORE_DIR") {
        config.store_dir = Some(PathBuf::from(dir));
    }
    if let Ok(value) = std::env::var("QUIZSCORE_PARALLELISM") {
        config.parallelism = value
            .parse()
            .with_context(|| format!("invalid QUIZSCORE_PARALLELISM: {value}"))?;
    }

    config.output_dir = resolve_path(&config.output_dir);
    config.store_dir = config.store_dir.as_deref().map(resolve_path);

    anyhow::ensure!(config.parallelism >= 1, "parallelism must be at least 1");

    Ok(config)
}

/// Parse a config file's contents.
pub fn parse_config_str(content: &str) -> Result<QuizscoreConfig> {
    Ok(toml::from_str(content)?)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizscore"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_QUIZSCORE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_QUIZSCORE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_QUIZSCORE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_QUIZSCORE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = QuizscoreConfig::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.limits.max_formula_len, 1024);
        assert!(!config.scoring.require_complete);
        assert!(config.store_dir.is_none());
    }

    #[test]
    fn parse_partial_config() {
        let config = parse_config_str(
            r#"
parallelism = 8
store_dir = "./records"

[limits]
max_combo_depth = 4

[scoring]
require_complete = true
"#,
        )
        .unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.limits.max_combo_depth, 4);
        assert_eq!(config.limits.max_formula_depth, 64);
        assert!(config.scoring.require_complete);
        assert_eq!(config.store_dir, Some(PathBuf::from("./records")));

        let engine = config.engine_config();
        assert_eq!(engine.parallelism, 8);
        assert!(engine.options.require_complete);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quizscore.toml");
        std::fs::write(&path, "[limits]\nmax_formula_len = 16\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.limits.max_formula_len, 16);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_config_str("parallelism = \"many\"").is_err());
    }
}
