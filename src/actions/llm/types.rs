use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::OptionalModelConfig;
use crate::prompt::{PromptInput, QuoteStyle};

/// Output an invocation resolves to when referenced without a field
pub const DEFAULT_OUTPUT: &str = "response";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Inputs {
    /// Overrides for the host's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<OptionalModelConfig>,

    /// Defaults to XML-style quotes for Claude models and backticks for others
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_style: Option<QuoteStyle>,

    /// A template string, or a list of text, role and context elements
    pub prompt: PromptInput,

    /// JSON schema per output property, forcing structured output.
    ///
    /// When a schema omits `required`, all of its properties are required.
    /// The prompt must still ask for JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Outputs {
    /// Deprecated mirror of `response`
    pub result: String,

    /// Text response so far; a JSON string when `output_schema` is set
    pub response: String,

    /// Structured data following `output_schema`, null otherwise
    pub data: Option<Value>,
}

impl Outputs {
    pub fn new(response: impl Into<String>, data: Option<Value>) -> Self {
        let response = response.into();
        Self {
            result: response.clone(),
            response,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inputs_from_json() {
        let inputs: Inputs = serde_json::from_value(json!({
            "model": {"model": "claude-3-haiku-20240307", "temperature": 0.0},
            "quote_style": "xml",
            "prompt": [{"role": "system"}, "Be brief", {"var": "topic"}],
            "output_schema": {"answer": {"type": "string"}},
        }))
        .unwrap();

        assert_eq!(inputs.quote_style, Some(QuoteStyle::Xml));
        assert!(matches!(inputs.prompt, PromptInput::Elements(ref e) if e.len() == 3));
        assert!(inputs.output_schema.unwrap().contains_key("answer"));
    }

    #[test]
    fn test_outputs_data_serializes_as_null() {
        let value = serde_json::to_value(Outputs::new("hi", None)).unwrap();
        assert_eq!(value, json!({"result": "hi", "response": "hi", "data": null}));
    }
}
