//! Rendered prompt elements

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::PromptError;
use crate::providers::Role;

/// How context elements are quoted in the prompt text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    Backticks,
    Xml,
}

impl QuoteStyle {
    /// XML-style tags for Claude models, backticks for everything else
    pub fn default_for_model(model: &str) -> Self {
        if model.contains("claude") {
            QuoteStyle::Xml
        } else {
            QuoteStyle::Backticks
        }
    }
}

impl fmt::Display for QuoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteStyle::Backticks => f.write_str("backticks"),
            QuoteStyle::Xml => f.write_str("xml"),
        }
    }
}

/// Switches the role of the following elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleElement {
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextElement {
    pub text: String,
    pub role: Option<Role>,
}

/// A quoted block of context under a heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextElement {
    pub heading: String,
    pub value: String,
}

impl ContextElement {
    pub fn as_string(&self, quote_style: QuoteStyle) -> String {
        match quote_style {
            QuoteStyle::Backticks => {
                format!("{}:\n```\n{}\n```", self.heading, self.value)
            }
            QuoteStyle::Xml => {
                format!("<{}>\n{}\n</{}>", self.heading, self.value, self.heading)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptElement {
    Role(RoleElement),
    Text(TextElement),
    Context(ContextElement),
    Plain(String),
}

impl PromptElement {
    /// The role this element switches to before it is rendered, if any
    pub fn role_switch(&self) -> Option<Role> {
        match self {
            PromptElement::Role(element) => Some(element.role),
            PromptElement::Text(element) => element.role,
            PromptElement::Context(_) | PromptElement::Plain(_) => None,
        }
    }

    pub fn as_string(&self, quote_style: QuoteStyle) -> Result<String, PromptError> {
        match self {
            PromptElement::Role(_) => Err(PromptError::RoleNotRenderable),
            PromptElement::Text(element) => Ok(element.text.clone()),
            PromptElement::Context(element) => Ok(element.as_string(quote_style)),
            PromptElement::Plain(text) => Ok(text.clone()),
        }
    }
}

impl From<&str> for PromptElement {
    fn from(text: &str) -> Self {
        PromptElement::Plain(text.to_string())
    }
}

impl From<ContextElement> for PromptElement {
    fn from(element: ContextElement) -> Self {
        PromptElement::Context(element)
    }
}
