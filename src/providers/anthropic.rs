//! Anthropic messages API backend (Claude models)

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::lines::{lines, send, sse_data};
use super::{
    endpoint, ChatMessage, CompletionRequest, Delta, DeltaStream, LlmBackend, LlmError, Role,
    STRUCTURED_OUTPUT_TOOL,
};
use crate::secrets::ANTHROPIC_API_KEY;

const PROVIDER: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// System messages are lifted into the `system` field, joined by a blank line
    fn split_system(messages: &[ChatMessage]) -> (String, Vec<&ChatMessage>) {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let conversation = messages.iter().filter(|m| m.role != Role::System).collect();
        (system, conversation)
    }

    pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
        let model = &request.model;
        let (system, conversation) = Self::split_system(&request.messages);

        let mut body = json!({
            "model": model.model,
            "max_tokens": model.max_output_tokens,
            "messages": conversation,
            "stream": true,
        });

        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temperature) = model.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = model.top_p {
            body["top_p"] = json!(top_p);
        }

        if let Some(schema) = &request.schema {
            body["tools"] = json!([{
                "name": STRUCTURED_OUTPUT_TOOL,
                "input_schema": schema,
            }]);
            body["tool_choice"] = json!({ "type": "tool", "name": STRUCTURED_OUTPUT_TOOL });
        }

        body
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { index: usize, delta: BlockDelta },
    MessageStop,
    Error { error: ErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum EventOutcome {
    Emit(Delta),
    Skip,
    End,
}

fn process_line(line: &str) -> Result<EventOutcome, LlmError> {
    let data = match sse_data(line) {
        Some(data) if !data.trim().is_empty() => data,
        _ => return Ok(EventOutcome::Skip),
    };

    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| LlmError::stream(PROVIDER, format!("invalid event: {e}")))?;

    match event {
        StreamEvent::ContentBlockDelta { index, delta } => Ok(match delta {
            BlockDelta::TextDelta { text } => EventOutcome::Emit(Delta::text(text)),
            BlockDelta::InputJsonDelta { partial_json } => {
                EventOutcome::Emit(Delta::tool(index, partial_json))
            }
            BlockDelta::Other => EventOutcome::Skip,
        }),
        StreamEvent::MessageStop => Ok(EventOutcome::End),
        StreamEvent::Error { error } => Err(LlmError::stream(
            PROVIDER,
            format!("{}: {}", error.kind, error.message),
        )),
        StreamEvent::Other => Ok(EventOutcome::Skip),
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, LlmError> {
        let api_key = self.api_key.clone().ok_or(LlmError::MissingCredential {
            provider: PROVIDER,
            secret: ANTHROPIC_API_KEY,
        })?;

        if request.model.api_base.is_some() {
            tracing::warn!("Ignoring api_base for Claude models");
        }

        let url = endpoint(&self.base_url, "messages");
        let body = Self::build_request_body(&request);
        tracing::debug!(url = %url, model = %request.model.model, structured = request.schema.is_some(), "Sending request to Anthropic");

        let http = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response = send(http, PROVIDER).await?;

        let stream = try_stream! {
            let mut lines = Box::pin(lines(response, PROVIDER));
            while let Some(line) = lines.next().await {
                match process_line(&line?)? {
                    EventOutcome::Emit(delta) => yield delta,
                    EventOutcome::Skip => {}
                    EventOutcome::End => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;

    fn request(schema: Option<Value>) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::new(Role::System, "Be terse."),
                ChatMessage::new(Role::User, "Hello"),
                ChatMessage::new(Role::System, "No emoji."),
                ChatMessage::new(Role::Assistant, "Hi"),
            ],
            model: ModelConfig::named("claude-3-5-sonnet-20240620"),
            schema,
        }
    }

    #[test]
    fn test_system_messages_are_lifted() {
        let body = AnthropicBackend::build_request_body(&request(None));

        assert_eq!(body["system"], "Be terse.\n\nNo emoji.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 2000);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_schema_forces_tool_use() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        let body = AnthropicBackend::build_request_body(&request(Some(schema.clone())));

        assert_eq!(body["tools"][0]["name"], STRUCTURED_OUTPUT_TOOL);
        assert_eq!(body["tools"][0]["input_schema"], schema);
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], STRUCTURED_OUTPUT_TOOL);
    }

    #[test]
    fn test_process_events() {
        let text = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#;
        assert_eq!(process_line(text).unwrap(), EventOutcome::Emit(Delta::text("Hel")));

        let json = r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"n\":"}}"#;
        assert_eq!(process_line(json).unwrap(), EventOutcome::Emit(Delta::tool(1, "{\"n\":")));

        assert_eq!(process_line("event: ping").unwrap(), EventOutcome::Skip);
        assert_eq!(process_line(r#"data: {"type":"ping"}"#).unwrap(), EventOutcome::Skip);
        assert_eq!(process_line(r#"data: {"type":"message_stop"}"#).unwrap(), EventOutcome::End);
    }

    #[test]
    fn test_error_event_is_stream_error() {
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = process_line(line).unwrap_err();
        assert_eq!(
            err.to_string(),
            "anthropic stream interrupted: overloaded_error: Overloaded"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_reported() {
        let backend = AnthropicBackend::new("http://127.0.0.1:9", None);
        let err = match backend.stream(request(None)).await {
            Err(err) => err,
            Ok(_) => panic!("expected missing credential"),
        };
        assert!(matches!(
            err,
            LlmError::MissingCredential { secret: ANTHROPIC_API_KEY, .. }
        ));
    }
}
