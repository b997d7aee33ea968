//! Model configuration shared by the host defaults and action inputs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;
pub const DEFAULT_MAX_PROMPT_TOKENS: u32 = 8000;

/// Fully resolved model configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelConfig {
    /// Model identifier, e.g. `gpt-4o`, `claude-3-5-sonnet-20240620`, `ollama/llama3`
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Prompts longer than this are trimmed before sending
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    /// Override the provider endpoint (ignored for Claude models)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

fn default_max_prompt_tokens() -> u32 {
    DEFAULT_MAX_PROMPT_TOKENS
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::named(DEFAULT_MODEL)
    }
}

impl ModelConfig {
    pub fn named(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            max_prompt_tokens: DEFAULT_MAX_PROMPT_TOKENS,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            api_base: None,
            auth_token: None,
        }
    }

    pub fn is_claude(&self) -> bool {
        self.model.contains("claude")
    }
}

/// Partial model configuration as written in action inputs
///
/// Only the fields that are set override the host default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptionalModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl OptionalModelConfig {
    /// Overlay the fields set here onto `base`
    pub fn apply_to(&self, base: &ModelConfig) -> ModelConfig {
        let mut resolved = base.clone();
        if let Some(model) = &self.model {
            resolved.model.clone_from(model);
        }
        if self.temperature.is_some() {
            resolved.temperature = self.temperature;
        }
        if let Some(max) = self.max_output_tokens {
            resolved.max_output_tokens = max;
        }
        if let Some(max) = self.max_prompt_tokens {
            resolved.max_prompt_tokens = max;
        }
        if self.top_p.is_some() {
            resolved.top_p = self.top_p;
        }
        if self.frequency_penalty.is_some() {
            resolved.frequency_penalty = self.frequency_penalty;
        }
        if self.presence_penalty.is_some() {
            resolved.presence_penalty = self.presence_penalty;
        }
        if self.api_base.is_some() {
            resolved.api_base.clone_from(&self.api_base);
        }
        if self.auth_token.is_some() {
            resolved.auth_token.clone_from(&self.auth_token);
        }
        resolved
    }
}

/// Resolve the model used for one invocation
pub fn resolve(default: &ModelConfig, overrides: Option<&OptionalModelConfig>) -> ModelConfig {
    match overrides {
        Some(overrides) => overrides.apply_to(default),
        None => default.clone(),
    }
}
