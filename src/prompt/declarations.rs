//! Prompt declarations as written in action inputs
//!
//! Declarations are rendered against the invocation's variable context
//! into [`PromptElement`]s. Strings and `text` fields are jinja
//! templates rendered without HTML escaping; `var` and `link` are dotted
//! paths into the context.

use minijinja::{AutoEscape, Environment};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::elements::{ContextElement, PromptElement, RoleElement, TextElement};
use super::PromptError;
use crate::providers::Role;

/// The `prompt` input: a bare template or a list of declarations
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum PromptInput {
    Text(String),
    Elements(Vec<PromptDeclaration>),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum PromptDeclaration {
    Plain(String),
    Role(RoleDeclaration),
    Text(TextDeclaration),
    Template(ContextTemplate),
    Var(ContextVar),
    Link(ContextLink),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoleDeclaration {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TextDeclaration {
    /// Template rendered against the variable context
    pub text: String,
    /// Switch to this role before the text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Templated context block
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContextTemplate {
    pub heading: String,
    pub text: String,
}

/// Context block holding a variable's value
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContextVar {
    /// Inferred from `var` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub var: String,
}

/// Context block holding another action's output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContextLink {
    /// Inferred from `link` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub link: String,
}

impl PromptDeclaration {
    pub fn render(&self, context: &Value) -> Result<PromptElement, PromptError> {
        match self {
            PromptDeclaration::Plain(template) => {
                Ok(PromptElement::Plain(render_template(template, context)?))
            }
            PromptDeclaration::Role(decl) => Ok(PromptElement::Role(RoleElement { role: decl.role })),
            PromptDeclaration::Text(decl) => Ok(PromptElement::Text(TextElement {
                text: render_template(&decl.text, context)?,
                role: decl.role,
            })),
            PromptDeclaration::Template(decl) => Ok(PromptElement::Context(ContextElement {
                heading: render_template(&decl.heading, context)?,
                value: render_template(&decl.text, context)?,
            })),
            PromptDeclaration::Var(decl) => {
                reference_element(decl.heading.as_deref(), &decl.var, context)
            }
            PromptDeclaration::Link(decl) => {
                reference_element(decl.heading.as_deref(), &decl.link, context)
            }
        }
    }
}

impl PromptInput {
    /// Render every declaration in order
    pub fn render(&self, context: &Value) -> Result<Vec<PromptElement>, PromptError> {
        match self {
            PromptInput::Text(template) => {
                Ok(vec![PromptElement::Plain(render_template(template, context)?)])
            }
            PromptInput::Elements(declarations) => declarations
                .iter()
                .map(|decl| decl.render(context))
                .collect(),
        }
    }
}

fn reference_element(
    heading: Option<&str>,
    path: &str,
    context: &Value,
) -> Result<PromptElement, PromptError> {
    let value = lookup(context, path).ok_or_else(|| PromptError::Unresolved(path.to_string()))?;
    let heading = match heading {
        Some(template) => render_template(template, context)?,
        None => infer_heading(path),
    };
    Ok(PromptElement::Context(ContextElement {
        heading,
        value: value_to_string(value),
    }))
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    // Prompt text goes to a model, not a browser
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}

/// Render a jinja template; strings without tags pass through untouched
pub fn render_template(template: &str, context: &Value) -> Result<String, PromptError> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template.to_string());
    }
    template_env()
        .render_str(template, context)
        .map_err(|e| PromptError::Template {
            template: template.to_string(),
            message: e.to_string(),
        })
}

/// Resolve a dotted path; numeric segments index into arrays
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Strings verbatim, everything else as compact JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `user_profile.first_name` -> `User Profile First Name`
pub fn infer_heading(path: &str) -> String {
    let spaced = path.replace(['.', '_'], " ");
    let mut heading = String::with_capacity(spaced.len());
    let mut previous_is_letter = false;
    for c in spaced.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                heading.extend(c.to_lowercase());
            } else {
                heading.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            heading.push(c);
            previous_is_letter = false;
        }
    }
    heading
}
