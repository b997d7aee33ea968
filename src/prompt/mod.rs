//! Prompt assembly: declarations from action inputs, rendered elements,
//! and the quoting used to lay context into message text.

pub mod declarations;
pub mod elements;

use thiserror::Error;

pub use declarations::{
    infer_heading, lookup, render_template, ContextLink, ContextTemplate, ContextVar,
    PromptDeclaration, PromptInput, RoleDeclaration, TextDeclaration,
};
pub use elements::{ContextElement, PromptElement, QuoteStyle, RoleElement, TextElement};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unresolved reference `{0}`")]
    Unresolved(String),

    #[error("failed to render template `{template}`: {message}")]
    Template { template: String, message: String },

    #[error("RoleElement cannot be converted to a string")]
    RoleNotRenderable,

    #[error("Failed to trim messages")]
    TrimFailed {
        token_count: usize,
        max_prompt_tokens: usize,
    },
}
