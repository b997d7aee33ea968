//! Line framing for streamed provider bodies
//!
//! Ollama streams NDJSON; Anthropic and OpenAI stream server-sent events.
//! Both arrive as arbitrary byte chunks that may split a line (or a UTF-8
//! sequence) anywhere.

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use super::error::LlmError;

/// Accumulates bytes and hands out complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk; returns every line it completed, without terminators
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush an unterminated trailing line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(line)
    }
}

/// Payload of an SSE `data:` line
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

/// Stream the response body as lines
pub(crate) fn lines(
    response: reqwest::Response,
    provider: &'static str,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer = LineBuffer::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::stream(provider, e.to_string()))?;
            for line in buffer.push(&chunk) {
                yield line;
            }
        }

        if let Some(line) = buffer.finish() {
            yield line;
        }
    }
}

/// Send a prepared request, turning non-success statuses into errors
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    provider: &'static str,
) -> Result<reqwest::Response, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::transport(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}
