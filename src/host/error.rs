use thiserror::Error;

use crate::prompt::PromptError;
use crate::providers::LlmError;
use crate::retry::Transient;

/// Failures of the registry itself, raised before an action runs
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Invalid action id: {0}")]
    InvalidActionId(String),

    #[error("Action {action} is registered at version {registered}, not {requested}")]
    VersionMismatch {
        action: String,
        requested: u32,
        registered: u32,
    },

    #[error("Invalid inputs for {action}: {message}")]
    InvalidInputs { action: String, message: String },
}

/// Failures raised while an action is running
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("output_schema is not a valid JSON schema")]
    InvalidOutputSchema,

    #[error("Data returned by LLM does not adhere to output schema")]
    SchemaViolation,

    #[error("failed to serialize outputs: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ActionError {
    /// Whether invoking again may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ActionError::Llm(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_violation_message() {
        assert_eq!(
            ActionError::SchemaViolation.to_string(),
            "Data returned by LLM does not adhere to output schema"
        );
        assert!(!ActionError::SchemaViolation.is_recoverable());
    }

    #[test]
    fn test_transient_llm_errors_are_recoverable() {
        let err = ActionError::from(LlmError::Status {
            provider: "openai",
            status: 503,
            body: String::new(),
        });
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "openai API error (status 503): ");
    }
}
