//! Shared helpers: a scripted mock provider served by axum, and stream
//! collection utilities.

#![allow(dead_code)]

use aijson_ml::host::{ActionStreamEvent, ActionStreamItem};
use aijson_ml::ActionRegistry;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Mock provider
// =============================================================================

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn sse(events: &[&str]) -> Self {
        let body = events
            .iter()
            .map(|event| format!("data: {event}\n\n"))
            .collect::<String>();
        Self {
            status: 200,
            content_type: "text/event-stream",
            body,
        }
    }

    pub fn raw(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Serves scripted replies in order; the last reply repeats
pub struct MockProvider {
    replies: Vec<Reply>,
    served: AtomicUsize,
    requests: Mutex<Vec<Recorded>>,
}

impl MockProvider {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

async fn handle(
    State(mock): State<Arc<MockProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    mock.requests.lock().unwrap().push(Recorded { headers, body });
    let index = mock.served.fetch_add(1, Ordering::SeqCst);
    let reply = mock.replies[index.min(mock.replies.len() - 1)].clone();
    (
        StatusCode::from_u16(reply.status).unwrap(),
        [(header::CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
}

/// Start a mock answering POSTs on `path`; returns it with its base URL
pub async fn spawn_mock(path: &str, replies: Vec<Reply>) -> (Arc<MockProvider>, String) {
    assert!(!replies.is_empty());
    let mock = Arc::new(MockProvider {
        replies,
        served: AtomicUsize::new(0),
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route(path, post(handle))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (mock, format!("http://{addr}"))
}

// =============================================================================
// Stream helpers
// =============================================================================

pub async fn invoke_all(
    registry: &ActionRegistry,
    action: &str,
    inputs: Value,
    ctx: aijson_ml::ActionContext,
) -> Vec<ActionStreamItem> {
    registry
        .invoke(action, inputs, ctx)
        .expect("invocation should start")
        .collect()
        .await
}

/// Payloads of the `data` items, in order
pub fn data_of(items: &[ActionStreamItem]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| match &item.event {
            ActionStreamEvent::Data { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

/// Message and recoverability of the first `error` item
pub fn error_of(items: &[ActionStreamItem]) -> Option<(String, bool)> {
    items.iter().find_map(|item| match &item.event {
        ActionStreamEvent::Error {
            message,
            recoverable,
            ..
        } => Some((message.clone(), *recoverable)),
        _ => None,
    })
}
