//! The `llm` action

use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::cost::estimate_cost;
use super::messages::build_messages;
use super::structured::{narrow_outputs_schema, parse_structured_response, OutputSchema};
use super::types::{Inputs, Outputs, DEFAULT_OUTPUT};
use crate::host::{Action, ActionContext, ActionError, OutputStream};
use crate::model::resolve;
use crate::providers::{
    backend_for, CompletionRequest, Delta, LlmBackend, LlmError, ProviderId,
};
use crate::retry::RetryPolicy;
use crate::timing::Timer;

pub const ACTION_NAME: &str = "llm";
pub const ACTION_VERSION: u32 = 0;

/// Prompt a language model and stream back its response
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmAction;

impl Action for LlmAction {
    type Inputs = Inputs;
    type Outputs = Outputs;

    fn name(&self) -> &str {
        ACTION_NAME
    }

    fn version(&self) -> u32 {
        ACTION_VERSION
    }

    fn description(&self) -> &str {
        "Prompt the LLM with a message and receive a response."
    }

    fn default_output(&self) -> Option<&str> {
        Some(DEFAULT_OUTPUT)
    }

    fn run(&self, inputs: Inputs, ctx: ActionContext) -> OutputStream<Outputs> {
        Box::pin(run(inputs, ctx))
    }

    fn narrow_outputs_schema(&self, invocation: &Value) -> Option<Value> {
        narrow_outputs_schema(invocation)
    }
}

/// Running totals over one streamed completion
#[derive(Debug, Default)]
pub struct Accumulator {
    pub output: String,
    /// Raw JSON fragments per tool call index
    pub tool_responses: BTreeMap<usize, String>,
    /// Union of every tool response that already parses as an object
    pub partial_data: Map<String, Value>,
}

impl Accumulator {
    pub fn push(&mut self, delta: &Delta) {
        self.output.push_str(&delta.text);
        if let Some(index) = delta.tool_index {
            let response = self.tool_responses.entry(index).or_default();
            response.push_str(&delta.text);
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(response) {
                self.partial_data.extend(object);
            }
        }
    }

    pub fn outputs(&self) -> Outputs {
        let data = if self.partial_data.is_empty() {
            None
        } else {
            Some(Value::Object(self.partial_data.clone()))
        };
        Outputs::new(self.output.clone(), data)
    }
}

/// Stream deltas from `backend`, logging time to first token and time blocked
fn invoke_llm<'a>(
    backend: &'a dyn LlmBackend,
    request: CompletionRequest,
) -> impl Stream<Item = Result<Delta, LlmError>> + Send + 'a {
    try_stream! {
        let provider = backend.name();
        let mut timer = Timer::start();
        let mut deltas = timer.measure(backend.stream(request)).await?;

        let mut first_completion_received = false;
        while let Some(delta) = timer.measure(deltas.next()).await {
            let delta = delta?;
            if !first_completion_received {
                info!(provider, seconds = timer.wall_time(), "First completion received");
                first_completion_received = true;
            }
            yield delta;
        }
        info!(provider, blocking_time = timer.blocking_time(), "Invoked LLM");
    }
}

fn run(inputs: Inputs, ctx: ActionContext) -> impl Stream<Item = Result<Outputs, ActionError>> + Send {
    try_stream! {
        let run_id = ctx.run_id;
        let model = resolve(&ctx.default_model, inputs.model.as_ref());

        let elements = inputs.prompt.render(&ctx.variables)?;
        let messages = build_messages(&elements, &model, inputs.quote_style)?;

        let schema = match &inputs.output_schema {
            Some(properties) => Some(
                OutputSchema::from_properties(properties).ok_or(ActionError::InvalidOutputSchema)?,
            ),
            None => None,
        };

        let provider = ProviderId::route(&model.model);
        let backend = backend_for(provider, &ctx.providers, &ctx.secrets)?;
        let request = CompletionRequest {
            messages: messages.clone(),
            model: model.clone(),
            schema: schema.as_ref().map(|s| s.schema().clone()),
        };
        debug!(%run_id, %provider, model = %model.model, message_count = messages.len(), "Prompting LLM");

        let policy = RetryPolicy::new(ctx.retry.clone());
        let mut attempt = 0usize;

        // Retry restarts the completion from scratch; outputs already yielded are superseded
        let completed = loop {
            let mut acc = Accumulator::default();
            let mut failure = None;
            {
                let deltas = invoke_llm(backend.as_ref(), request.clone());
                pin_mut!(deltas);
                while let Some(delta) = deltas.next().await {
                    match delta {
                        Ok(delta) => {
                            acc.push(&delta);
                            yield acc.outputs();
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }

            match failure {
                None => break acc,
                Some(e) => {
                    if policy.should_retry(&e, attempt) {
                        let delay = policy.next_delay(attempt);
                        warn!(
                            %run_id,
                            attempt = attempt + 1,
                            delay_secs = delay.as_secs_f64(),
                            error = %e,
                            "Retrying LLM invocation"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        Err::<(), _>(ActionError::from(e))?;
                    }
                }
            }
        };

        let estimated_cost_usd = match estimate_cost(&model.model, &messages, &completed.output) {
            Ok(cost) => Some(cost),
            Err(e) => {
                warn!(model = %model.model, error = %e, "Failed to estimate cost");
                None
            }
        };
        info!(
            %run_id,
            model = %model.model,
            message_count = messages.len(),
            response_chars = completed.output.len(),
            estimated_cost_usd,
            "Prompt completed"
        );
        debug!(%run_id, ?messages, result = %completed.output, "Prompt transcript");

        if let Some(schema) = &schema {
            let data = parse_structured_response(&completed.tool_responses, &completed.output, schema)
                .ok_or(ActionError::SchemaViolation)?;
            yield Outputs::new(completed.output, Some(data));
        }
    }
}
