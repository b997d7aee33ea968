//! The `Action` trait and its type-erased form held by the registry

use futures::{Stream, StreamExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;

use super::context::ActionContext;
use super::error::{ActionError, HostError};
use crate::types::ActionId;

/// Boxed stream of action outputs
pub type OutputStream<O> = Pin<Box<dyn Stream<Item = Result<O, ActionError>> + Send>>;

/// A named, versioned unit of work with typed inputs and streamed outputs
pub trait Action: Send + Sync + 'static {
    type Inputs: DeserializeOwned + JsonSchema + Send + 'static;
    type Outputs: Serialize + JsonSchema + Send + 'static;

    fn name(&self) -> &str;
    fn version(&self) -> u32;
    fn description(&self) -> &str {
        "No description available"
    }

    /// Output a reference to this action resolves to when it names no field
    fn default_output(&self) -> Option<&str> {
        None
    }

    /// Run the action; every item is a complete snapshot of the outputs so far
    fn run(&self, inputs: Self::Inputs, ctx: ActionContext) -> OutputStream<Self::Outputs>;

    /// Outputs schema specialised to one invocation's (raw) inputs
    ///
    /// `None` means no schema can be derived for this invocation.
    fn narrow_outputs_schema(&self, _invocation: &Value) -> Option<Value> {
        Some(schema_value::<Self::Outputs>())
    }

    fn id(&self) -> ActionId {
        ActionId::local(self.version(), self.name())
    }
}

/// JSON schema of `T` as a plain value
pub fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}

pub(crate) trait ErasedAction: Send + Sync + 'static {
    fn id(&self) -> ActionId;
    fn name(&self) -> &str;
    fn version(&self) -> u32;
    fn description(&self) -> &str;
    fn default_output(&self) -> Option<&str>;
    fn inputs_schema(&self) -> Value;
    fn outputs_schema(&self) -> Value;
    fn narrow_outputs_schema(&self, invocation: &Value) -> Option<Value>;
    fn invoke(&self, inputs: Value, ctx: ActionContext) -> Result<OutputStream<Value>, HostError>;
}

pub(crate) struct ActionWrapper<A: Action> {
    inner: A,
}

impl<A: Action> ActionWrapper<A> {
    pub(crate) fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A: Action> ErasedAction for ActionWrapper<A> {
    fn id(&self) -> ActionId {
        self.inner.id()
    }
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn version(&self) -> u32 {
        self.inner.version()
    }
    fn description(&self) -> &str {
        self.inner.description()
    }
    fn default_output(&self) -> Option<&str> {
        self.inner.default_output()
    }

    fn inputs_schema(&self) -> Value {
        schema_value::<A::Inputs>()
    }

    fn outputs_schema(&self) -> Value {
        schema_value::<A::Outputs>()
    }

    fn narrow_outputs_schema(&self, invocation: &Value) -> Option<Value> {
        self.inner.narrow_outputs_schema(invocation)
    }

    fn invoke(&self, inputs: Value, ctx: ActionContext) -> Result<OutputStream<Value>, HostError> {
        let inputs: A::Inputs =
            serde_json::from_value(inputs).map_err(|e| HostError::InvalidInputs {
                action: self.inner.name().to_string(),
                message: e.to_string(),
            })?;

        let outputs = self.inner.run(inputs, ctx).map(|item| {
            item.and_then(|outputs| serde_json::to_value(outputs).map_err(ActionError::from))
        });
        Ok(Box::pin(outputs))
    }
}
