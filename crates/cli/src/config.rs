//! CLI configuration: model backend endpoint, credentials, and defaults.
//!
//! The file is JSON. String values may reference environment variables as
//! `${env:NAME}`; a reference to an unset variable is an error.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::config_dir;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable that overrides the default configuration path.
pub const CONFIG_PATH_ENV: &str = "AISPEC_CONFIG_PATH";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Falls back to `OPENAI_API_KEY` when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Model used when no assistant, workflow, or step declares one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            default_model: default_model(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("environment variable '{name}' referenced in config is not set")]
    MissingEnvVar { name: String },
    #[error("invalid interpolation pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Returns the default configuration path, honoring `AISPEC_CONFIG_PATH`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(path.trim());
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("aispec").join("config.json")
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs_next::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Loads configuration from `path`, or defaults when the file does not exist.
pub fn load_config_from_path(path: &Path) -> Result<CliConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(CliConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: CliConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    interpolate_config(&mut config)?;
    Ok(config)
}

fn interpolate_config(config: &mut CliConfig) -> Result<(), ConfigError> {
    config.backend.base_url = interpolate_string(&config.backend.base_url)?;
    if let Some(api_key) = config.backend.api_key.as_mut() {
        *api_key = interpolate_string(api_key)?;
    }
    config.default_model = interpolate_string(&config.default_model)?;
    Ok(())
}

/// Replaces `${env:NAME}` references with the variable's value.
fn interpolate_string(value: &str) -> Result<String, ConfigError> {
    let env_regex = Regex::new(r"\$\{env:([\w+_-]*)}")?;

    let mut result = value.to_string();
    for capture in env_regex.captures_iter(value) {
        let name = capture[1].to_string();
        let env_value = env::var(&name).map_err(|_| ConfigError::MissingEnvVar { name: name.clone() })?;
        debug!(name = %name, "interpolated env var -> [REDACTED]");
        result = result.replace(&capture[0], &env_value);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_honors_environment_override() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("/tmp/aispec/custom.json"), || {
            assert_eq!(default_config_path(), PathBuf::from("/tmp/aispec/custom.json"));
        });
    }

    #[test]
    fn override_path_expands_home() {
        let Some(home) = dirs_next::home_dir() else {
            return;
        };
        temp_env::with_var(CONFIG_PATH_ENV, Some("~/aispec.json"), || {
            assert_eq!(default_config_path(), home.join("aispec.json"));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn interpolates_environment_references() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"backend": {"base_url": "http://localhost:8080/v1", "api_key": "${env:AISPEC_TEST_KEY}"}, "default_model": "gpt-4"}"#,
        )
        .unwrap();

        temp_env::with_var("AISPEC_TEST_KEY", Some("sk-test"), || {
            let config = load_config_from_path(&path).unwrap();
            assert_eq!(config.backend.api_key.as_deref(), Some("sk-test"));
            assert_eq!(config.backend.timeout_secs, DEFAULT_TIMEOUT_SECS);
            assert_eq!(config.default_model, "gpt-4");
        });
    }

    #[test]
    fn unset_environment_reference_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"backend": {"api_key": "${env:AISPEC_UNSET_KEY}"}}"#).unwrap();

        temp_env::with_var_unset("AISPEC_UNSET_KEY", || {
            let error = load_config_from_path(&path).unwrap_err();
            assert!(matches!(error, ConfigError::MissingEnvVar { ref name } if name == "AISPEC_UNSET_KEY"));
        });
    }
}
