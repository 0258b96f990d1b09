//! CLI-level configuration: database location, artifacts directory, and the
//! default agent-resolution fallback, loaded from a file plus `DAGFLOW__`-
//! prefixed environment overrides via `dagflow_kernel::config`.

use crate::error::CliError;
use config::{Config as Cfg, Environment, File};
use dagflow_kernel::config::{detect_format, substitute_env_vars};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CliConfig {
    /// sqlite DSN, e.g. `sqlite://dagflow.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Root directory tools resolve artifact paths under.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Default `(provider, model)` used when a goal's target agent has none
    /// configured and no agent row exists yet.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_database_url() -> String {
    "sqlite://dagflow.db".to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            artifacts_dir: default_artifacts_dir(),
            default_provider: default_provider(),
            default_model: default_model(),
        }
    }
}

impl CliConfig {
    /// Load from an explicit path, falling back to `dagflow.{yaml,yml,json,toml}`
    /// discovered upward from the current directory, then to defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, CliError> {
        let resolved = path.or_else(find_config_upward);
        let Some(path) = resolved else {
            return Ok(Self::default());
        };
        let format = detect_format(&path.to_string_lossy())
            .map_err(|e| CliError::ConfigError(e.to_string()))?;
        let content = std::fs::read_to_string(&path)?;
        let substituted = substitute_env_vars(&content);
        let built = Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(Environment::with_prefix("DAGFLOW").separator("__"))
            .build()
            .map_err(|e| CliError::ConfigError(e.to_string()))?;
        built.try_deserialize().map_err(|e| CliError::ConfigError(e.to_string()))
    }
}

fn find_config_upward() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        for name in ["dagflow.yaml", "dagflow.yml", "dagflow.json", "dagflow.toml"] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_config_file() {
        let config = CliConfig::default();
        assert_eq!(config.database_url, "sqlite://dagflow.db");
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_explicit_path_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("dagflow-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dagflow.json");
        std::fs::write(&path, r#"{"database_url": "sqlite:///tmp/custom.db"}"#).unwrap();
        let config = CliConfig::load(Some(path)).unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/custom.db");
        assert_eq!(config.default_provider, "openai");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
