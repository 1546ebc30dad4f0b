//! Fallback aggregation.
//!
//! When no primary completion endpoint is configured, queries are served by
//! racing the configured secondary providers instead. Semantics are
//! "wait for all, take first good": every enabled provider is launched
//! concurrently, all are awaited to settlement (the surrounding deadline
//! guard bounds stragglers), and the first provider *in configured priority
//! order* with non-empty content wins, so a fast-but-empty provider never
//! shadows a slower usable one.
//!
//! If no provider produces usable content the aggregator returns a canned
//! insufficient-resources reply; this path always succeeds from the caller's
//! perspective. The provider list may be empty.

use crate::Result;
use crate::types::ConversationMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Canned reply when no provider produces usable content
pub const INSUFFICIENT_RESOURCES: &str =
    "I couldn't find enough resources to respond to that.  Try again later?";

/// A secondary completion source, consulted only when no primary endpoint is
/// configured.
#[async_trait]
pub trait FallbackProvider: Send + Sync {
    /// Provider name, for log attribution
    fn name(&self) -> &str;

    /// Produce a completion for the assembled message list
    async fn complete(&self, messages: &[ConversationMessage]) -> Result<String>;
}

/// Launch all providers, await settlement, select by priority order.
pub async fn aggregate(
    providers: &[Arc<dyn FallbackProvider>],
    messages: &[ConversationMessage],
) -> String {
    let settled = futures::future::join_all(providers.iter().map(|provider| async move {
        (provider.name().to_string(), provider.complete(messages).await)
    }))
    .await;

    for (name, outcome) in settled {
        match outcome {
            Ok(content) if !content.trim().is_empty() => {
                log::debug!("fallback provider {name} selected");
                return content;
            }
            Ok(_) => log::debug!("fallback provider {name} returned empty content"),
            Err(e) => log::warn!("fallback provider {name} failed: {e}"),
        }
    }

    INSUFFICIENT_RESOURCES.to_string()
}
