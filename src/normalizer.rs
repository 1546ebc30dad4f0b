//! Response normalization.
//!
//! Reasoning models interleave out-of-band `<think>...</think>` annotation
//! blocks with their visible output. Those blocks are never part of the
//! answer, so every response path (whole, streaming, tool-looped, fallback)
//! runs its final content through [`strip_think_tags`] before it reaches an
//! [`AgentResponse`](crate::AgentResponse) or a terminal stream event.

use regex::Regex;
use std::sync::LazyLock;

/// Matches `<think>...</think>` non-greedily, case-insensitively, across
/// newlines. Unterminated blocks are left alone; content is never dropped
/// on the suspicion it might be an annotation.
static THINK_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("static pattern compiles"));

/// Strip think-tag annotation blocks and trim surrounding whitespace.
pub fn strip_think_tags(text: &str) -> String {
    THINK_TAGS.replace_all(text, "").trim().to_string()
}
