use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ActionId;

/// Inner stream event (the actual payload)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ActionStreamEvent {
    /// One output of the action
    #[serde(rename = "data")]
    Data { action: String, data: Value },

    /// The action failed; no more data follows
    #[serde(rename = "error")]
    Error {
        action: String,
        message: String,
        recoverable: bool,
    },

    /// Stream completed
    #[serde(rename = "done")]
    Done { action: String },
}

/// Stream item stamped with the registry hash
///
/// Clients compare `registry_hash` against their cached schema to detect
/// when the set of registered actions changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionStreamItem {
    pub registry_hash: String,

    #[serde(flatten)]
    pub event: ActionStreamEvent,
}

impl ActionStreamItem {
    pub fn new(registry_hash: String, event: ActionStreamEvent) -> Self {
        Self {
            registry_hash,
            event,
        }
    }

    pub fn data(registry_hash: String, action: String, data: Value) -> Self {
        Self::new(registry_hash, ActionStreamEvent::Data { action, data })
    }

    pub fn error(registry_hash: String, action: String, message: String, recoverable: bool) -> Self {
        Self::new(
            registry_hash,
            ActionStreamEvent::Error {
                action,
                message,
                recoverable,
            },
        )
    }

    pub fn done(registry_hash: String, action: String) -> Self {
        Self::new(registry_hash, ActionStreamEvent::Done { action })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.event, ActionStreamEvent::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ActionInfo {
    pub id: ActionId,
    pub name: String,
    pub version: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,
}

/// Inputs and outputs JSON schema of one action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionSchema {
    pub id: ActionId,
    pub name: String,
    pub version: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_output: Option<String>,
    pub inputs: Value,
    pub outputs: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_item_is_flattened() {
        let item = ActionStreamItem::data("abc".into(), "aijson-ml@0::llm".into(), json!({"response": "hi"}));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "registry_hash": "abc",
                "type": "data",
                "action": "aijson-ml@0::llm",
                "data": {"response": "hi"},
            })
        );

        let parsed: ActionStreamItem = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_done_is_terminal() {
        assert!(ActionStreamItem::done("h".into(), "a".into()).is_terminal());
        assert!(!ActionStreamItem::error("h".into(), "a".into(), "boom".into(), false).is_terminal());
    }
}
