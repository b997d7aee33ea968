//! Structured output: building the object schema, reading the model's JSON
//! back and validating it.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::error;

use super::types::Outputs;
use crate::host::schema_value;

/// Compiled object schema for an `output_schema` input
pub struct OutputSchema {
    schema: Value,
    validator: jsonschema::JSONSchema,
}

impl OutputSchema {
    /// `None` when the resulting schema is not valid JSON schema
    pub fn from_properties(properties: &Map<String, Value>) -> Option<Self> {
        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        require_all_by_default(&mut schema);

        let validator = match jsonschema::JSONSchema::compile(&schema) {
            Ok(validator) => validator,
            Err(e) => {
                error!(error = %e, "Invalid output schema");
                return None;
            }
        };
        Some(Self { schema, validator })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        self.validator
            .validate(data)
            .map_err(|errors| errors.map(|e| format!("{}: {}", e.instance_path, e)).collect())
    }
}

/// Objects that omit `required` require every property, at any depth
fn require_all_by_default(schema: &mut Value) {
    let Value::Object(object) = schema else {
        return;
    };

    if let Some(Value::Object(properties)) = object.get_mut("properties") {
        for property in properties.values_mut() {
            require_all_by_default(property);
        }
    }
    if let Some(items) = object.get_mut("items") {
        require_all_by_default(items);
    }
    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(variants)) = object.get_mut(key) {
            variants.iter_mut().for_each(require_all_by_default);
        }
    }

    if object.contains_key("required") {
        return;
    }
    let names: Vec<Value> = match object.get("properties") {
        Some(Value::Object(properties)) => {
            properties.keys().cloned().map(Value::String).collect()
        }
        _ => return,
    };
    object.insert("required".into(), Value::Array(names));
}

/// Outputs schema for one invocation of the `llm` action
///
/// Without `output_schema`, `data` is always null. With one, `data` is its
/// object schema. An unusable `output_schema` yields `None`.
pub fn narrow_outputs_schema(invocation: &Value) -> Option<Value> {
    let data_schema = match invocation.get("output_schema") {
        None | Some(Value::Null) => json!({"type": "null"}),
        Some(Value::Object(properties)) => OutputSchema::from_properties(properties)?.schema,
        Some(_) => return None,
    };

    let mut schema = schema_value::<Outputs>();
    let properties = schema.get_mut("properties").and_then(Value::as_object_mut)?;
    properties.insert("data".into(), data_schema);
    Some(schema)
}

/// Parse the model's structured answer and check it against `schema`
///
/// Tool-call responses, when present, are each parsed and merged; otherwise
/// the whole text output is parsed.
pub fn parse_structured_response(
    tool_responses: &BTreeMap<usize, String>,
    output: &str,
    schema: &OutputSchema,
) -> Option<Value> {
    let data = if tool_responses.is_empty() {
        match serde_json::from_str::<Value>(output) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, output, "Failed to parse JSON response");
                return None;
            }
        }
    } else {
        let mut merged = Map::new();
        for response in tool_responses.values() {
            match serde_json::from_str::<Value>(response) {
                Ok(Value::Object(object)) => merged.extend(object),
                Ok(other) => {
                    error!(response = %other, "Tool response is not a JSON object");
                    return None;
                }
                Err(e) => {
                    error!(error = %e, ?tool_responses, "Failed to parse JSON response");
                    return None;
                }
            }
        }
        Value::Object(merged)
    };

    if let Err(errors) = schema.validate(&data) {
        error!(%data, ?errors, "Generated data does not adhere to schema");
        return None;
    }
    Some(data)
}
