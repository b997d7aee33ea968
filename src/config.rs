//! Configuration loaded from `config.toml`
//!
//! Lookup order: an explicit path, then `$AIJSON_ML_CONFIG`, then
//! `<config dir>/aijson-ml/config.toml`. A missing file at the default
//! location means defaults; a missing explicit file is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::host::ActionContext;
use crate::model::ModelConfig;
use crate::providers::ProviderSettings;
use crate::retry::RetryConfig;
use crate::secrets::SecretStore;

pub const CONFIG_ENV_VAR: &str = "AIJSON_ML_CONFIG";
const CONFIG_DIR_NAME: &str = "aijson-ml";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Model used when an invocation does not pick one
    pub default_model: ModelConfig,
    pub retry: RetryConfig,
    pub providers: ProviderSettings,
    /// Secret values that take precedence over the environment
    pub secrets: HashMap<String, String>,
    pub host: HostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    /// Upper bound on one action invocation, including retries
    pub action_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        self.retry.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: format!("[retry] {message}"),
        })
    }

    /// `<config dir>/aijson-ml/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `explicit`, the environment variable, or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.host.action_timeout_secs.map(Duration::from_secs)
    }

    /// Base context for invocations: config values over the environment
    pub fn action_context(&self) -> ActionContext {
        ActionContext::new()
            .with_default_model(self.default_model.clone())
            .with_retry(self.retry.clone())
            .with_providers(self.providers.clone())
            .with_secrets(SecretStore::from_env().extend(self.secrets.clone()))
            .with_timeout(self.action_timeout())
    }
}
