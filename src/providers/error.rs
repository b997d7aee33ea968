//! Provider error types

use thiserror::Error;

use crate::retry::Transient;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection-level failure (DNS, TLS, reset, timeout)
    #[error("failed to reach {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{provider} API error (status {status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Body stream broke off or the provider sent an error event mid-stream
    #[error("{provider} stream interrupted: {message}")]
    Stream {
        provider: &'static str,
        message: String,
    },

    /// A required credential is not configured
    #[error("{provider} requires the `{secret}` secret")]
    MissingCredential {
        provider: &'static str,
        secret: &'static str,
    },

    /// Provider support was compiled out
    #[error("provider `{0}` is not enabled; build with the `{0}` feature")]
    ProviderDisabled(&'static str),
}

impl LlmError {
    pub(crate) fn transport(provider: &'static str, source: reqwest::Error) -> Self {
        LlmError::Transport { provider, source }
    }

    pub(crate) fn stream(provider: &'static str, message: impl Into<String>) -> Self {
        LlmError::Stream {
            provider,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport { .. } | LlmError::Stream { .. } => true,
            LlmError::Status { status, .. } => {
                matches!(status, 408 | 409 | 429) || *status >= 500
            }
            LlmError::MissingCredential { .. } | LlmError::ProviderDisabled(_) => false,
        }
    }
}
