//! `llm` action: prompt a language model, stream its response, optionally
//! forcing structured output that follows a JSON schema.

pub mod action;
pub mod cost;
pub mod messages;
pub mod structured;
pub mod types;

pub use action::{LlmAction, ACTION_NAME, ACTION_VERSION};
pub use types::{Inputs, Outputs, DEFAULT_OUTPUT};
