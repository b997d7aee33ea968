//! LLM provider backends
//!
//! Every backend turns a [`CompletionRequest`] into a stream of [`Delta`]s.
//! Plain-text completions carry no tool index; structured completions that
//! go through tool calling tag each fragment with the index of the tool call
//! (or content block) it belongs to.

pub mod error;
pub mod lines;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;

use crate::model::ModelConfig;
use crate::secrets::SecretStore;

pub use error::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Name of the single tool used to force structured output
pub const STRUCTURED_OUTPUT_TOOL: &str = "function";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything a backend needs for one completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: ModelConfig,
    /// Object JSON schema the output must follow
    pub schema: Option<Value>,
}

/// One streamed fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub text: String,
    pub tool_index: Option<usize>,
}

impl Delta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_index: None,
        }
    }

    pub fn tool(index: usize, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_index: Some(index),
        }
    }
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, LlmError>> + Send>>;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a streamed completion
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, LlmError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Anthropic,
    Ollama,
    OpenAi,
}

impl ProviderId {
    /// Pick the provider that serves `model`
    pub fn route(model: &str) -> Self {
        if model.starts_with("claude") {
            ProviderId::Anthropic
        } else if model.starts_with("ollama/") {
            ProviderId::Ollama
        } else {
            ProviderId::OpenAi
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint overrides from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderSettings {
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub ollama_base_url: Option<String>,
}

/// Build the backend for `provider`
pub fn backend_for(
    provider: ProviderId,
    settings: &ProviderSettings,
    secrets: &SecretStore,
) -> Result<Box<dyn LlmBackend>, LlmError> {
    match provider {
        #[cfg(feature = "anthropic")]
        ProviderId::Anthropic => {
            let base_url = settings
                .anthropic_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string());
            Ok(Box::new(anthropic::AnthropicBackend::new(
                base_url,
                secrets.get(crate::secrets::ANTHROPIC_API_KEY),
            )))
        }
        #[cfg(feature = "ollama")]
        ProviderId::Ollama => {
            let base_url = secrets
                .get(crate::secrets::OLLAMA_API_BASE)
                .or_else(|| settings.ollama_base_url.clone())
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
            Ok(Box::new(ollama::OllamaBackend::new(base_url)))
        }
        #[cfg(feature = "openai")]
        ProviderId::OpenAi => {
            let base_url = settings
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
            Ok(Box::new(openai::OpenAiBackend::new(
                base_url,
                secrets.get(crate::secrets::OPENAI_API_KEY),
            )))
        }
        #[allow(unreachable_patterns)]
        other => Err(LlmError::ProviderDisabled(other.as_str())),
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
