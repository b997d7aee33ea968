//! OpenAI-compatible chat completions backend.
//!
//! Serves every model that is neither Claude nor Ollama. Structured output
//! uses `response_format: json_schema` for `gpt` models and a required tool
//! call for everything else.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::lines::{lines, send, sse_data};
use super::{
    endpoint, CompletionRequest, Delta, DeltaStream, LlmBackend, LlmError,
    DEFAULT_OPENAI_BASE_URL, STRUCTURED_OUTPUT_TOOL,
};

const PROVIDER: &str = "openai";

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Models outside the `gpt` family get a forced tool call instead of `response_format`
    pub fn uses_tool_calling(model: &str) -> bool {
        !model.contains("gpt")
    }

    /// Provider prefix of a model that would be sent to api.openai.com,
    /// which only serves its own unprefixed models
    pub fn foreign_prefix<'m>(model: &'m str, base_url: &str) -> Option<&'m str> {
        if base_url.trim_end_matches('/') != DEFAULT_OPENAI_BASE_URL {
            return None;
        }
        let name = model.strip_prefix("openai/").unwrap_or(model);
        name.split_once('/').map(|(prefix, _)| prefix)
    }

    pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
        let model = &request.model;
        let model_name = model.model.strip_prefix("openai/").unwrap_or(&model.model);

        let mut body = json!({
            "model": model_name,
            "messages": request.messages,
            "stream": true,
            "max_tokens": model.max_output_tokens,
        });

        if let Some(temperature) = model.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = model.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(penalty) = model.frequency_penalty {
            body["frequency_penalty"] = json!(penalty);
        }
        if let Some(penalty) = model.presence_penalty {
            body["presence_penalty"] = json!(penalty);
        }

        if let Some(schema) = &request.schema {
            if Self::uses_tool_calling(&model.model) {
                body["tool_choice"] = json!("required");
                body["tools"] = json!([{
                    "type": "function",
                    "function": {
                        "name": STRUCTURED_OUTPUT_TOOL,
                        "parameters": schema,
                    }
                }]);
            } else {
                body["response_format"] = json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": STRUCTURED_OUTPUT_TOOL,
                        "schema": schema,
                        "strict": true,
                    }
                });
            }
        }

        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    arguments: Option<String>,
}

/// Outcome of one SSE line
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    Emit(Delta),
    Skip,
    End,
}

fn process_line(line: &str, tool_mode: bool) -> Result<ChunkOutcome, LlmError> {
    let data = match sse_data(line) {
        Some(data) => data.trim(),
        None => return Ok(ChunkOutcome::Skip),
    };
    if data.is_empty() {
        return Ok(ChunkOutcome::Skip);
    }
    if data == "[DONE]" {
        return Ok(ChunkOutcome::End);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::stream(PROVIDER, format!("invalid chunk: {e}")))?;

    let choice = match chunk.choices.into_iter().next() {
        Some(choice) => choice,
        None => return Ok(ChunkOutcome::Skip),
    };

    let delta = if tool_mode {
        choice
            .delta
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .and_then(|call| {
                let index = call.index;
                call.function
                    .and_then(|f| f.arguments)
                    .map(|args| Delta::tool(index, args))
            })
    } else {
        choice.delta.content.map(Delta::text)
    };

    Ok(match delta {
        Some(delta) => ChunkOutcome::Emit(delta),
        None => ChunkOutcome::End,
    })
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, LlmError> {
        let model = &request.model;
        if self.api_key.is_none() && model.model.contains("gpt") {
            tracing::warn!(model = %model.model, "OpenAI API key not set");
        }

        let base = model.api_base.as_deref().unwrap_or(&self.base_url);
        if let Some(prefix) = Self::foreign_prefix(&model.model, base) {
            tracing::warn!(
                model = %model.model,
                prefix,
                "Model has a provider prefix but no api_base; sending it to the OpenAI API, which will likely reject it"
            );
        }
        let url = endpoint(base, "chat/completions");
        let body = Self::build_request_body(&request);
        let tool_mode = request.schema.is_some() && Self::uses_tool_calling(&model.model);

        tracing::debug!(url = %url, model = %model.model, tool_mode, "Sending request to OpenAI-compatible endpoint");

        let mut http = self.client.post(&url).json(&body);
        if let Some(token) = model.auth_token.as_ref().or(self.api_key.as_ref()) {
            http = http.bearer_auth(token);
        }

        let response = send(http, PROVIDER).await?;

        let stream = try_stream! {
            let mut lines = Box::pin(lines(response, PROVIDER));
            while let Some(line) = lines.next().await {
                match process_line(&line?, tool_mode)? {
                    ChunkOutcome::Emit(delta) => yield delta,
                    ChunkOutcome::Skip => {}
                    ChunkOutcome::End => break,
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
    use crate::providers::{ChatMessage, Role};

    fn request(model: &str, schema: Option<Value>) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::new(Role::User, "Hello")],
            model: ModelConfig::named(model),
            schema,
        }
    }

    #[test]
    fn test_foreign_prefix() {
        assert_eq!(
            OpenAiBackend::foreign_prefix("groq/llama3-70b", DEFAULT_OPENAI_BASE_URL),
            Some("groq")
        );
        assert_eq!(
            OpenAiBackend::foreign_prefix("bedrock/claude-v2", "https://api.openai.com/v1/"),
            Some("bedrock")
        );
        assert_eq!(OpenAiBackend::foreign_prefix("openai/gpt-4o", DEFAULT_OPENAI_BASE_URL), None);
        assert_eq!(OpenAiBackend::foreign_prefix("gpt-4o", DEFAULT_OPENAI_BASE_URL), None);
        assert_eq!(
            OpenAiBackend::foreign_prefix("groq/llama3-70b", "https://api.groq.com/openai/v1"),
            None
        );
    }

    #[test]
    fn test_build_request_body_plain() {
        let mut req = request("gpt-4o", None);
        req.model.temperature = Some(0.3);
        let body = OpenAiBackend::build_request_body(&req);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("top_p").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_gpt_schema_uses_response_format() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let body = OpenAiBackend::build_request_body(&request("gpt-4o", Some(schema.clone())));

        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_other_models_schema_uses_tools() {
        let schema = json!({"type": "object", "properties": {}});
        let body =
            OpenAiBackend::build_request_body(&request("openai/mistral-large", Some(schema)));

        assert_eq!(body["model"], "mistral-large");
        assert_eq!(body["tool_choice"], "required");
        assert_eq!(body["tools"][0]["function"]["name"], STRUCTURED_OUTPUT_TOOL);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_process_text_chunks() {
        let first = r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        assert_eq!(process_line(first, false).unwrap(), ChunkOutcome::Emit(Delta::text("")));

        let text = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(process_line(text, false).unwrap(), ChunkOutcome::Emit(Delta::text("Hi")));

        let last = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(process_line(last, false).unwrap(), ChunkOutcome::End);

        assert_eq!(process_line("data: [DONE]", false).unwrap(), ChunkOutcome::End);
        assert_eq!(process_line(": keep-alive", false).unwrap(), ChunkOutcome::Skip);
        assert_eq!(process_line(r#"data: {"choices":[]}"#, false).unwrap(), ChunkOutcome::Skip);
    }

    #[test]
    fn test_process_tool_chunks() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\""}}]}}]}"#;
        assert_eq!(
            process_line(line, true).unwrap(),
            ChunkOutcome::Emit(Delta::tool(0, "{\"a\""))
        );

        let no_tool = r#"data: {"choices":[{"delta":{"content":"text"}}]}"#;
        assert_eq!(process_line(no_tool, true).unwrap(), ChunkOutcome::End);
    }

    #[test]
    fn test_process_invalid_chunk_is_stream_error() {
        let err = process_line("data: {not json", false).unwrap_err();
        assert!(matches!(err, LlmError::Stream { .. }));
    }
}
