//! Per-invocation context handed to actions
//!
//! Carries what the host owns rather than the action inputs: the default
//! model, the variables templates are rendered against, secrets, provider
//! endpoints and the retry policy.

use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::model::ModelConfig;
use crate::providers::ProviderSettings;
use crate::retry::RetryConfig;
use crate::secrets::SecretStore;

#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Identifies one invocation in logs
    pub run_id: Uuid,
    pub default_model: ModelConfig,
    /// JSON object that `var` and `link` declarations resolve against
    pub variables: Value,
    pub secrets: SecretStore,
    pub providers: ProviderSettings,
    pub retry: RetryConfig,
    /// Deadline for the whole output stream
    pub timeout: Option<Duration>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            default_model: ModelConfig::default(),
            variables: Value::Object(serde_json::Map::new()),
            secrets: SecretStore::from_env(),
            providers: ProviderSettings::default(),
            retry: RetryConfig::default(),
            timeout: None,
        }
    }

    pub fn with_default_model(mut self, model: ModelConfig) -> Self {
        self.default_model = model;
        self
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Set one top-level variable
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        if !self.variables.is_object() {
            self.variables = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.variables {
            map.insert(name.into(), value);
        }
        self
    }

    pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_providers(mut self, providers: ProviderSettings) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Copy of this context for another invocation
    pub fn fork(&self) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::new()
    }
}
