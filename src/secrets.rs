//! Secret lookup
//!
//! Values configured explicitly win over the process environment. Empty
//! values count as unset.

use std::collections::HashMap;

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const OLLAMA_API_BASE: &str = "OLLAMA_API_BASE";

#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    overrides: HashMap<String, String>,
    read_env: bool,
}

impl SecretStore {
    /// Store backed by the process environment
    pub fn from_env() -> Self {
        Self {
            overrides: HashMap::new(),
            read_env: true,
        }
    }

    /// Store with only explicit values, never consulting the environment
    pub fn isolated() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn extend(mut self, values: HashMap<String, String>) -> Self {
        self.overrides.extend(values);
        self
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let value = match self.overrides.get(name) {
            Some(value) => Some(value.clone()),
            None if self.read_env => std::env::var(name).ok(),
            None => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }
}
