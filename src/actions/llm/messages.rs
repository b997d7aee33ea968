//! Turning rendered prompt elements into chat messages
//!
//! Token counts are estimated (four characters per token plus a fixed
//! per-message overhead); they only need to be good enough to keep prompts
//! under the configured budget.

use tracing::{error, warn};

use crate::model::ModelConfig;
use crate::prompt::{PromptElement, PromptError, QuoteStyle};
use crate::providers::{ChatMessage, Role};

/// Tokens charged per message for role and framing
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;
const CHARS_PER_TOKEN: usize = 4;
const ELLIPSIS: &str = "...";

pub fn count_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn count_message_tokens(message: &ChatMessage) -> usize {
    MESSAGE_OVERHEAD_TOKENS + count_text_tokens(&message.content)
}

pub fn count_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(count_message_tokens).sum()
}

/// Group elements into messages
///
/// Elements accumulate under the current role (initially `user`). A role
/// element, or a text element carrying a role, closes the accumulated
/// elements into one message, joined by blank lines, and switches role.
pub fn build_messages(
    elements: &[PromptElement],
    model: &ModelConfig,
    quote_style: Option<QuoteStyle>,
) -> Result<Vec<ChatMessage>, PromptError> {
    let quote_style = quote_style.unwrap_or_else(|| QuoteStyle::default_for_model(&model.model));

    let mut messages = Vec::new();
    let mut role = Role::User;
    let mut pending: Vec<String> = Vec::new();

    for element in elements {
        if let Some(next) = element.role_switch() {
            deposit(&mut messages, role, &mut pending);
            role = next;
            if matches!(element, PromptElement::Role(_)) {
                continue;
            }
        }
        pending.push(element.as_string(quote_style)?);
    }
    deposit(&mut messages, role, &mut pending);

    let token_count = count_tokens(&messages);
    let max_prompt_tokens = model.max_prompt_tokens as usize;
    if token_count > max_prompt_tokens {
        warn!(token_count, max_prompt_tokens, "Trimming messages");
        messages = trim_messages(&messages, max_prompt_tokens).ok_or_else(|| {
            error!(token_count, max_prompt_tokens, "Failed to trim messages");
            PromptError::TrimFailed {
                token_count,
                max_prompt_tokens,
            }
        })?;
    }

    Ok(messages)
}

fn deposit(messages: &mut Vec<ChatMessage>, role: Role, pending: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }
    messages.push(ChatMessage::new(role, pending.join("\n\n")));
    pending.clear();
}

/// Fit messages into `max_tokens`
///
/// System messages are always kept. The rest are kept newest first; the
/// first one that does not fit is shortened from the middle and older
/// ones are dropped. Returns `None` when nothing but system messages (or
/// not even those) would fit.
pub fn trim_messages(messages: &[ChatMessage], max_tokens: usize) -> Option<Vec<ChatMessage>> {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        messages.iter().partition(|m| m.role == Role::System);

    let system_tokens: usize = system.iter().map(|m| count_message_tokens(m)).sum();
    let mut budget = max_tokens.checked_sub(system_tokens)?;

    let mut kept: Vec<ChatMessage> = Vec::new();
    for message in rest.into_iter().rev() {
        let cost = count_message_tokens(message);
        if cost <= budget {
            budget -= cost;
            kept.push(message.clone());
            continue;
        }

        let available_chars = budget.saturating_sub(MESSAGE_OVERHEAD_TOKENS) * CHARS_PER_TOKEN;
        if let Some(content) = shorten_middle(&message.content, available_chars) {
            kept.push(ChatMessage::new(message.role, content));
        }
        break;
    }

    if kept.is_empty() {
        return None;
    }

    kept.reverse();
    let mut trimmed: Vec<ChatMessage> = system.into_iter().cloned().collect();
    trimmed.extend(kept);
    Some(trimmed)
}

/// Keep the start and end of `text` within `max_chars`, joined by an ellipsis
fn shorten_middle(text: &str, max_chars: usize) -> Option<String> {
    let ellipsis_len = ELLIPSIS.chars().count();
    if max_chars <= ellipsis_len {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return Some(text.to_string());
    }

    let keep = max_chars - ellipsis_len;
    let head = keep.div_ceil(2);
    let tail = keep - head;

    let mut shortened: String = chars[..head].iter().collect();
    shortened.push_str(ELLIPSIS);
    shortened.extend(&chars[chars.len() - tail..]);
    Some(shortened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ContextElement, RoleElement, TextElement};

    fn plain(text: &str) -> PromptElement {
        PromptElement::Plain(text.to_string())
    }

    fn role(role: Role) -> PromptElement {
        PromptElement::Role(RoleElement { role })
    }

    #[test]
    fn test_single_string_is_one_user_message() {
        let messages =
            build_messages(&[plain("Hello")], &ModelConfig::named("gpt-4o"), None).unwrap();
        assert_eq!(messages, vec![ChatMessage::new(Role::User, "Hello")]);
    }

    #[test]
    fn test_role_switches_deposit_messages() {
        let elements = vec![
            role(Role::System),
            plain("You are terse."),
            plain("Answer in English."),
            role(Role::User),
            PromptElement::Context(ContextElement {
                heading: "Fruit".into(),
                value: "apple".into(),
            }),
            PromptElement::Text(TextElement {
                text: "Sure.".into(),
                role: Some(Role::Assistant),
            }),
            plain("Anything else?"),
        ];
        let messages = build_messages(&elements, &ModelConfig::named("gpt-4o"), None).unwrap();

        assert_eq!(
            messages,
            vec![
                ChatMessage::new(Role::System, "You are terse.\n\nAnswer in English."),
                ChatMessage::new(Role::User, "Fruit:\n```\napple\n```"),
                ChatMessage::new(Role::Assistant, "Sure.\n\nAnything else?"),
            ]
        );
    }

    #[test]
    fn test_empty_groups_produce_no_message() {
        let elements = vec![role(Role::System), role(Role::User), plain("hi"), role(Role::Assistant)];
        let messages = build_messages(&elements, &ModelConfig::named("gpt-4o"), None).unwrap();
        assert_eq!(messages, vec![ChatMessage::new(Role::User, "hi")]);
    }

    #[test]
    fn test_claude_defaults_to_xml() {
        let elements = vec![PromptElement::Context(ContextElement {
            heading: "doc".into(),
            value: "text".into(),
        })];
        let messages =
            build_messages(&elements, &ModelConfig::named("claude-3-haiku-20240307"), None).unwrap();
        assert_eq!(messages[0].content, "<doc>\ntext\n</doc>");

        let forced = build_messages(
            &elements,
            &ModelConfig::named("claude-3-haiku-20240307"),
            Some(QuoteStyle::Backticks),
        )
        .unwrap();
        assert_eq!(forced[0].content, "doc:\n```\ntext\n```");
    }

    #[test]
    fn test_count_tokens() {
        let messages = vec![ChatMessage::new(Role::User, "abcdefgh"), ChatMessage::new(Role::User, "abc")];
        assert_eq!(count_tokens(&messages), 4 + 2 + 4 + 1);
    }

    #[test]
    fn test_long_prompt_is_trimmed() {
        let mut model = ModelConfig::named("gpt-4o");
        model.max_prompt_tokens = 30;

        let elements = vec![
            role(Role::System),
            plain("Be brief."),
            role(Role::User),
            plain(&"x".repeat(400)),
        ];
        let messages = build_messages(&elements, &model, None).unwrap();

        assert_eq!(messages[0], ChatMessage::new(Role::System, "Be brief."));
        assert!(count_tokens(&messages) <= 30);
        assert!(messages[1].content.contains("..."));
        assert!(messages[1].content.starts_with('x'));
    }

    #[test]
    fn test_trim_drops_older_messages() {
        let messages = vec![
            ChatMessage::new(Role::User, "a".repeat(40)),
            ChatMessage::new(Role::Assistant, "b".repeat(40)),
            ChatMessage::new(Role::User, "c".repeat(40)),
        ];
        // each message costs 14 tokens
        let trimmed = trim_messages(&messages, 28).unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].role, Role::Assistant);
        assert_eq!(trimmed[1].content, "c".repeat(40));
    }

    #[test]
    fn test_trim_fails_when_system_fills_budget() {
        let mut model = ModelConfig::named("gpt-4o");
        model.max_prompt_tokens = 10;

        let elements = vec![role(Role::System), plain(&"s".repeat(200)), role(Role::User), plain("hi")];
        let err = build_messages(&elements, &model, None).unwrap_err();
        assert!(matches!(err, PromptError::TrimFailed { max_prompt_tokens: 10, .. }));
        assert_eq!(err.to_string(), "Failed to trim messages");
    }

    #[test]
    fn test_shorten_middle() {
        assert_eq!(shorten_middle("abcdefghij", 7).as_deref(), Some("ab...ij"));
        assert_eq!(shorten_middle("abc", 7).as_deref(), Some("abc"));
        assert_eq!(shorten_middle("abcdef", 3), None);
    }
}
