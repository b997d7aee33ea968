//! Registry builder - constructs the registry a host loads this plugin into
//!
//! This module is used by both the binary and integration tests.

use crate::actions;
use crate::host::ActionRegistry;

/// Registration function for a named entry point
pub type RegisterFn = fn(ActionRegistry) -> ActionRegistry;

/// Resolve an entry point name to its registration function
pub fn entry_point(name: &str) -> Option<RegisterFn> {
    match name {
        crate::ENTRY_POINT => Some(actions::register),
        _ => None,
    }
}

/// Build the registry with all actions registered
pub fn build_registry() -> ActionRegistry {
    let registry = actions::register(ActionRegistry::new());
    tracing::debug!(
        actions = registry.len(),
        hash = %registry.compute_hash(),
        "Registry built"
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_resolves_actions() {
        let register = entry_point("actions").unwrap();
        let registry = register(ActionRegistry::new());
        assert!(registry.contains("llm"));
        assert!(entry_point("transforms").is_none());
    }

    #[test]
    fn test_build_registry_matches_entry_point() {
        let register = entry_point(crate::ENTRY_POINT).unwrap();
        assert_eq!(
            build_registry().compute_hash(),
            register(ActionRegistry::new()).compute_hash()
        );
    }
}
