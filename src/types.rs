//! Plugin-level core types
//!
//! These types are shared across the actions and the host layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fully qualified reference to an action
///
/// Display format: `plugin@version::action`
///
/// Examples:
/// - `aijson-ml@0::llm`
/// - `aijson-ml@3::embed`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct ActionId {
    /// Plugin identifier (e.g., "aijson-ml")
    pub plugin: String,

    /// Action version (integer, bumped on breaking input/output changes)
    pub version: u32,

    /// Action name as registered with the host (e.g., "llm")
    pub action: String,
}

impl ActionId {
    pub fn new(plugin: impl Into<String>, version: u32, action: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            version,
            action: action.into(),
        }
    }

    /// Reference an action exported by this crate
    pub fn local(version: u32, action: impl Into<String>) -> Self {
        Self::new(crate::PLUGIN_NAME, version, action)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}::{}", self.plugin, self.version, self.action)
    }
}

impl FromStr for ActionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (plugin, rest) = s
            .split_once('@')
            .ok_or_else(|| format!("Invalid action id, missing '@': {}", s))?;

        let (version, action) = rest
            .split_once("::")
            .ok_or_else(|| format!("Invalid action id, missing '::': {}", s))?;

        let version: u32 = version
            .parse()
            .map_err(|_| format!("Invalid action id, version is not an integer: {}", s))?;

        if plugin.is_empty() || action.is_empty() {
            return Err(format!("Invalid action id, empty component: {}", s));
        }

        Ok(ActionId {
            plugin: plugin.to_string(),
            version,
            action: action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_display() {
        let id = ActionId::new("aijson-ml", 0, "llm");
        assert_eq!(id.to_string(), "aijson-ml@0::llm");
    }

    #[test]
    fn test_action_id_parse() {
        let id: ActionId = "aijson-ml@2::llm".parse().unwrap();
        assert_eq!(id.plugin, "aijson-ml");
        assert_eq!(id.version, 2);
        assert_eq!(id.action, "llm");
    }

    #[test]
    fn test_action_id_parse_rejects_bad_version() {
        assert!("aijson-ml@v1::llm".parse::<ActionId>().is_err());
        assert!("aijson-ml::llm".parse::<ActionId>().is_err());
        assert!("aijson-ml@1::".parse::<ActionId>().is_err());
    }

    #[test]
    fn test_local_uses_plugin_name() {
        let id = ActionId::local(0, "llm");
        assert_eq!(id.plugin, crate::PLUGIN_NAME);
    }
}
