//! JSON-RPC surface of the registry
//!
//! Every method is a subscription. Items are [`ActionStreamItem`]s sent as
//! raw JSON, and every subscription ends with a `done` item.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use jsonrpsee::core::SubscriptionResult;
use jsonrpsee::{proc_macros::rpc, PendingSubscriptionSink, RpcModule};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::ActionContext;
use super::registry::ActionRegistry;
use super::types::ActionStreamItem;

const HOST: &str = "aijson";

#[rpc(server, namespace = "aijson")]
pub trait AijsonRpc {
    /// Invoke an action; `variables` replaces the server's variable context
    #[subscription(name = "invoke", unsubscribe = "unsubscribe_invoke", item = Value)]
    async fn rpc_invoke(
        &self,
        action: String,
        inputs: Value,
        variables: Option<Value>,
    ) -> SubscriptionResult;

    #[subscription(name = "list_actions", unsubscribe = "unsubscribe_list_actions", item = Value)]
    async fn rpc_list_actions(&self) -> SubscriptionResult;

    #[subscription(name = "hash", unsubscribe = "unsubscribe_hash", item = Value)]
    async fn rpc_hash(&self) -> SubscriptionResult;
}

/// Registry plus the context every invocation starts from
#[derive(Clone)]
pub struct HostRpc {
    registry: Arc<ActionRegistry>,
    base_context: ActionContext,
}

impl HostRpc {
    pub fn new(registry: Arc<ActionRegistry>, base_context: ActionContext) -> Self {
        Self {
            registry,
            base_context,
        }
    }

    pub fn into_rpc_module(self) -> RpcModule<Self> {
        self.into_rpc()
    }

    fn single_item_stream(
        &self,
        data: Result<Value, serde_json::Error>,
    ) -> impl Stream<Item = ActionStreamItem> + Send + Unpin {
        futures::stream::iter(host_items(self.registry.compute_hash(), data))
    }
}

/// `data` then `done`, or `error` then `done` when the payload did not serialize
fn host_items(hash: String, data: Result<Value, serde_json::Error>) -> Vec<ActionStreamItem> {
    let first = match data {
        Ok(data) => ActionStreamItem::data(hash.clone(), HOST.into(), data),
        Err(e) => {
            warn!(error = %e, "Serialization error");
            ActionStreamItem::error(
                hash.clone(),
                HOST.into(),
                format!("failed to serialize response: {e}"),
                false,
            )
        }
    };
    vec![first, ActionStreamItem::done(hash, HOST.into())]
}

/// Forward stream items into an accepted subscription
async fn forward(
    pending: PendingSubscriptionSink,
    stream: impl Stream<Item = ActionStreamItem> + Send + Unpin + 'static,
) -> SubscriptionResult {
    let sink = pending.accept().await?;

    tokio::spawn(async move {
        let mut stream = stream;
        let mut item_count = 0u64;
        while let Some(item) = stream.next().await {
            item_count += 1;
            match serde_json::value::to_raw_value(&item) {
                Ok(raw) => {
                    if sink.send(raw).await.is_err() {
                        warn!(item_count, "Client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    warn!(item_count, error = %e, "Serialization error");
                    break;
                }
            }
        }
        debug!(item_count, "Subscription stream ended");
    });

    Ok(())
}

#[async_trait]
impl AijsonRpcServer for HostRpc {
    async fn rpc_invoke(
        &self,
        pending: PendingSubscriptionSink,
        action: String,
        inputs: Value,
        variables: Option<Value>,
    ) -> SubscriptionResult {
        let mut ctx = self.base_context.fork();
        if let Some(variables) = variables {
            ctx = ctx.with_variables(variables);
        }

        match self.registry.invoke(&action, inputs, ctx) {
            Ok(stream) => forward(pending, stream).await,
            Err(e) => {
                let hash = self.registry.compute_hash();
                let items = futures::stream::iter(vec![
                    ActionStreamItem::error(hash.clone(), action.clone(), e.to_string(), false),
                    ActionStreamItem::done(hash, action),
                ]);
                forward(pending, items).await
            }
        }
    }

    async fn rpc_list_actions(&self, pending: PendingSubscriptionSink) -> SubscriptionResult {
        let actions = serde_json::to_value(self.registry.list_actions());
        forward(pending, self.single_item_stream(actions)).await
    }

    async fn rpc_hash(&self, pending: PendingSubscriptionSink) -> SubscriptionResult {
        let hash = Value::String(self.registry.compute_hash());
        forward(pending, self.single_item_stream(Ok(hash))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ActionStreamEvent;
    use serde_json::json;

    #[test]
    fn test_host_items_data_then_done() {
        let items = host_items("h".into(), Ok(json!(["llm"])));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], ActionStreamItem::data("h".into(), "aijson".into(), json!(["llm"])));
        assert!(items[1].is_terminal());
    }

    #[test]
    fn test_serialization_failure_is_reported() {
        let failure = serde_json::from_str::<Value>("{").unwrap_err();
        let items = host_items("h".into(), Err(failure));

        assert_eq!(items.len(), 2);
        match &items[0].event {
            ActionStreamEvent::Error {
                action,
                message,
                recoverable,
            } => {
                assert_eq!(action, "aijson");
                assert!(message.starts_with("failed to serialize response: "), "{message}");
                assert!(!recoverable);
            }
            other => panic!("expected an error item, got {other:?}"),
        }
        assert!(items[1].is_terminal());
    }
}
