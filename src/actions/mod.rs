//! Actions exported through the `actions` entry point

pub mod llm;

use crate::host::ActionRegistry;

pub use llm::LlmAction;

/// Add every action this plugin provides
pub fn register(registry: ActionRegistry) -> ActionRegistry {
    registry.register(LlmAction)
}
