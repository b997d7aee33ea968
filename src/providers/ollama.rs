//! Ollama `/api/chat` backend (models named `ollama/<name>`)

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use super::lines::{lines, send};
use super::{endpoint, CompletionRequest, Delta, DeltaStream, LlmBackend, LlmError};

const PROVIDER: &str = "ollama";

pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
        let model = &request.model;
        let model_name = model.model.strip_prefix("ollama/").unwrap_or(&model.model);

        let mut options = serde_json::Map::new();
        if let Some(temperature) = model.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        options.insert("num_predict".into(), json!(model.max_output_tokens));

        let mut body = json!({
            "model": model_name,
            "messages": request.messages,
            "stream": true,
            "options": options,
        });

        // Ollama constrains generation to the schema but does not guarantee adherence
        if let Some(schema) = &request.schema {
            body["format"] = schema.clone();
        }

        body
    }
}

/// Text of one NDJSON line; `None` for blank, malformed or empty chunks
fn process_completion(line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;
    let content = value.get("message")?.get("content")?.as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, LlmError> {
        let base = request.model.api_base.as_deref().unwrap_or(&self.base_url);
        let url = endpoint(base, "api/chat");
        let body = Self::build_request_body(&request);
        tracing::debug!(url = %url, model = %request.model.model, "Sending request to Ollama");

        let mut http = self.client.post(&url).json(&body);
        if let Some(token) = &request.model.auth_token {
            http = http.bearer_auth(token);
        }

        let response = send(http, PROVIDER).await?;

        // Structured output arrives as plain text; it is parsed once the stream ends
        let stream = try_stream! {
            let mut lines = Box::pin(lines(response, PROVIDER));
            while let Some(line) = lines.next().await {
                if let Some(text) = process_completion(&line?) {
                    yield Delta::text(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
