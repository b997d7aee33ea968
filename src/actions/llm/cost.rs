//! Rough USD cost of a completion

use thiserror::Error;

use super::messages::{count_text_tokens, count_tokens};
use crate::providers::ChatMessage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CostError {
    #[error("no pricing known for model `{0}`")]
    UnknownModel(String),
}

/// USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const fn price(input: f64, output: f64) -> Pricing {
    Pricing { input, output }
}

/// Matched by longest prefix
const PRICES: &[(&str, Pricing)] = &[
    ("gpt-4o-mini", price(0.15, 0.6)),
    ("gpt-4o", price(2.5, 10.0)),
    ("gpt-4-turbo", price(10.0, 30.0)),
    ("gpt-4", price(30.0, 60.0)),
    ("gpt-3.5-turbo", price(0.5, 1.5)),
    ("o1-mini", price(3.0, 12.0)),
    ("o1", price(15.0, 60.0)),
    ("claude-3-5-sonnet", price(3.0, 15.0)),
    ("claude-3-5-haiku", price(0.8, 4.0)),
    ("claude-3-opus", price(15.0, 75.0)),
    ("claude-3-sonnet", price(3.0, 15.0)),
    ("claude-3-haiku", price(0.25, 1.25)),
];

pub fn pricing(model: &str) -> Result<Pricing, CostError> {
    if model.starts_with("ollama/") {
        return Ok(price(0.0, 0.0));
    }
    let name = model.strip_prefix("openai/").unwrap_or(model);
    PRICES
        .iter()
        .filter(|(prefix, _)| name.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, pricing)| *pricing)
        .ok_or_else(|| CostError::UnknownModel(model.to_string()))
}

pub fn estimate_cost(
    model: &str,
    messages: &[ChatMessage],
    completion: &str,
) -> Result<f64, CostError> {
    let pricing = pricing(model)?;
    let prompt_tokens = count_tokens(messages) as f64;
    let completion_tokens = count_text_tokens(completion) as f64;
    Ok((prompt_tokens * pricing.input + completion_tokens * pricing.output) / 1_000_000.0)
}
