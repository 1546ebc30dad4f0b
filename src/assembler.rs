//! Message assembly.
//!
//! Builds the ordered message list sent to the completion endpoint from the
//! raw request inputs: prior history, the current system prompt, optional
//! structured context, and the new user turn. This is a pure transform with
//! no side effects; both the whole-response and streaming paths share it.
//!
//! Invariant: the returned list always begins with exactly one `system`-role
//! message, and the new user turn is always last.

use crate::types::{ConversationMessage, Role};
use serde_json::Value;

/// Assemble the message list for one completion request.
///
/// If the first prior message is not a system message, one is prepended from
/// `prompt`; otherwise the existing system message is reused. When `context`
/// is present it is rendered as pretty-printed JSON and appended to the
/// system message's content, never to any other message. The new user turn
/// (attributed to `username` when given) is appended last.
///
/// An empty `prior` is valid and produces a two-message list (system + user).
pub fn assemble(
    prior: &[ConversationMessage],
    prompt: &str,
    context: Option<&Value>,
    query: &str,
    username: Option<&str>,
) -> Vec<ConversationMessage> {
    let mut messages: Vec<ConversationMessage> =
        Vec::with_capacity(prior.len() + 2);

    if prior.first().map(|m| m.role) != Some(Role::System) {
        messages.push(ConversationMessage::system(prompt));
        messages.extend_from_slice(prior);
    } else {
        messages.extend_from_slice(prior);
    }

    if let Some(context) = context {
        let rendered = serde_json::to_string_pretty(context).unwrap_or_default();
        messages[0].content.push_str(&format!(
            "\n\nThe following context is relevant to the query:\n\n{rendered}"
        ));
    }

    messages.push(ConversationMessage::user_from(
        query,
        username.map(str::to_string),
    ));

    messages
}
