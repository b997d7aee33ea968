//! Action registry - the host-side routing layer
//!
//! Actions register here by name. Invocations come back as a stream of
//! [`ActionStreamItem`]s: one `data` item per output, at most one `error`,
//! and always a closing `done`.

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use super::action::{Action, ActionWrapper, ErasedAction};
use super::context::ActionContext;
use super::error::HostError;
use super::types::{ActionInfo, ActionSchema, ActionStreamItem};
use crate::types::ActionId;

/// Boxed stream of registry stream items
pub type ActionStream = Pin<Box<dyn Stream<Item = ActionStreamItem> + Send>>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn ErasedAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any action of the same name
    pub fn register<A: Action>(mut self, action: A) -> Self {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            tracing::warn!(action = %name, "Replacing registered action");
        }
        self.actions.insert(name, Arc::new(ActionWrapper::new(action)));
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// All actions, sorted by name
    pub fn list_actions(&self) -> Vec<ActionInfo> {
        let mut actions: Vec<ActionInfo> = self
            .actions
            .values()
            .map(|a| ActionInfo {
                id: a.id(),
                name: a.name().to_string(),
                version: a.version(),
                description: a.description().to_string(),
                default_output: a.default_output().map(str::to_string),
            })
            .collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }

    /// Compute hash for cache invalidation
    pub fn compute_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut strings: Vec<String> = self
            .actions
            .values()
            .map(|a| format!("{}:{}", a.name(), a.version()))
            .collect();
        strings.sort();

        let mut hasher = DefaultHasher::new();
        strings.join(";").hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    pub fn schema(&self, name: &str) -> Option<ActionSchema> {
        self.actions.get(name).map(|a| describe(a.as_ref()))
    }

    /// Schemas of all actions, sorted by name
    pub fn full_schema(&self) -> Vec<ActionSchema> {
        let mut schemas: Vec<ActionSchema> =
            self.actions.values().map(|a| describe(a.as_ref())).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Outputs schema of `action` for a specific invocation
    pub fn narrow_outputs_schema(
        &self,
        action: &str,
        invocation: &Value,
    ) -> Result<Option<Value>, HostError> {
        let action = self.lookup(action)?;
        Ok(action.narrow_outputs_schema(invocation))
    }

    /// Accepts a bare name (`llm`) or a full id (`aijson-ml@0::llm`)
    fn lookup(&self, action: &str) -> Result<&Arc<dyn ErasedAction>, HostError> {
        if !action.contains('@') {
            return self
                .actions
                .get(action)
                .ok_or_else(|| HostError::ActionNotFound(action.to_string()));
        }

        let id: ActionId = action.parse().map_err(HostError::InvalidActionId)?;
        if id.plugin != crate::PLUGIN_NAME {
            return Err(HostError::ActionNotFound(action.to_string()));
        }
        let found = self
            .actions
            .get(&id.action)
            .ok_or_else(|| HostError::ActionNotFound(action.to_string()))?;
        if found.version() != id.version {
            return Err(HostError::VersionMismatch {
                action: id.action,
                requested: id.version,
                registered: found.version(),
            });
        }
        Ok(found)
    }

    /// Invoke an action with raw JSON inputs
    pub fn invoke(
        &self,
        action: &str,
        inputs: Value,
        ctx: ActionContext,
    ) -> Result<ActionStream, HostError> {
        let found = self.lookup(action)?;
        let id = found.id().to_string();
        let hash = self.compute_hash();
        let run_id = ctx.run_id;
        let deadline = ctx.timeout.map(|t| tokio::time::Instant::now() + t);

        tracing::debug!(action = %id, %run_id, "Invoking action");
        let mut outputs = found.invoke(inputs, ctx)?;

        Ok(Box::pin(stream! {
            let mut item_count = 0u64;
            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, outputs.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!(action = %id, %run_id, item_count, "Action timed out");
                            yield ActionStreamItem::error(hash.clone(), id.clone(), "action timed out".into(), false);
                            break;
                        }
                    },
                    None => outputs.next().await,
                };

                match next {
                    Some(Ok(data)) => {
                        item_count += 1;
                        yield ActionStreamItem::data(hash.clone(), id.clone(), data);
                    }
                    Some(Err(e)) => {
                        tracing::error!(action = %id, %run_id, error = %e, "Action failed");
                        yield ActionStreamItem::error(hash.clone(), id.clone(), e.to_string(), e.is_recoverable());
                        break;
                    }
                    None => break,
                }
            }
            tracing::debug!(action = %id, %run_id, item_count, "Action stream ended");
            yield ActionStreamItem::done(hash, id);
        }))
    }
}

fn describe(action: &dyn ErasedAction) -> ActionSchema {
    ActionSchema {
        id: action.id(),
        name: action.name().to_string(),
        version: action.version(),
        description: action.description().to_string(),
        default_output: action.default_output().map(str::to_string),
        inputs: action.inputs_schema(),
        outputs: action.outputs_schema(),
    }
}
