//! Core types for the agent orchestration crate.
//!
//! Three families live here:
//!
//! 1. **Conversation types** ([`Role`], [`ConversationMessage`]): the ordered
//!    message list handed to the completion endpoint. Order is semantically
//!    significant (it is the model's context window) and messages are
//!    immutable once appended to a request's list.
//!
//! 2. **Request/response types** ([`QueryRequest`], [`AgentResponse`],
//!    [`StreamEvent`], [`AgentEvent`]): the caller-facing surface. Exactly one
//!    [`AgentResponse`] is produced per top-level `query`/`query_stream`
//!    invocation; tool-call recursion is internal and not separately
//!    observable.
//!
//! 3. **Wire types** ([`CompletionRequest`], [`CompletionResponse`],
//!    [`StreamChunk`] and friends): the JSON envelope of the
//!    `/chat/completions` endpoint, shared by the whole-response and
//!    streaming paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Milliseconds since the Unix epoch; event timestamps are non-decreasing
/// within one stream because they are taken in emission order.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Message role in the conversation.
///
/// The legacy `agent` role is accepted on input and normalized to
/// `assistant`, matching upstream expectations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[serde(alias = "agent")]
    Assistant,
    Tool,
}

/// A single message in the ordered conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Correlates a `tool`-role message with the assistant tool call it answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Present only when replaying an assistant tool-call turn into history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
            username: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            username: None,
            tool_calls: None,
        }
    }

    /// User turn attributed to a named participant
    pub fn user_from(content: impl Into<String>, username: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            username,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            username: None,
            tool_calls: None,
        }
    }

    /// Tool result, tagged with the originating call id
    pub fn tool(content: impl Into<String>, call_id: Option<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: call_id,
            username: None,
            tool_calls: None,
        }
    }
}

/// A query against the agent.
///
/// Everything except `query` is optional; overrides fall back to the
/// [`AgentConfig`](crate::AgentConfig) defaults.
#[derive(Clone, Default)]
pub struct QueryRequest {
    /// The new user turn
    pub query: String,
    /// Prior conversation history (possibly empty)
    pub messages: Vec<ConversationMessage>,
    /// Per-request model override
    pub model: Option<String>,
    /// Per-request sampling overrides
    pub seed: Option<u64>,
    pub temperature: Option<f32>,
    /// Structured context, rendered into the system message
    pub context: Option<Value>,
    /// Output-format constraint: `"json"` or a JSON schema document
    pub format: Option<String>,
    /// Offer the configured tool manifest to the model
    pub tools: bool,
    /// Streaming correlation id; generated when absent
    pub message_id: Option<String>,
    /// Attribution for the user turn
    pub username: Option<String>,
    /// Explicit cancellation signal (e.g. client disconnect)
    pub cancel: Option<CancellationToken>,
    /// Per-request stream lifecycle channel, in addition to the agent sink
    pub events: Option<UnboundedSender<StreamEvent>>,
}

impl std::fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRequest")
            .field("query", &self.query)
            .field("messages", &self.messages.len())
            .field("model", &self.model)
            .field("format", &self.format)
            .field("tools", &self.tools)
            .field("message_id", &self.message_id)
            .finish()
    }
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_tools(mut self, tools: bool) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_events(mut self, sender: UnboundedSender<StreamEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Resolve the caller-supplied format constraint into the wire value.
    ///
    /// `"json"` passes through as the literal string; anything else must be a
    /// valid JSON schema document. An unparseable specifier is an
    /// [`Error::InvalidFormat`] rejection, not a structured error response.
    pub fn resolved_format(&self) -> Result<Option<Value>> {
        match self.format.as_deref() {
            None => Ok(None),
            Some("json") => Ok(Some(Value::String("json".to_string()))),
            Some(other) => match serde_json::from_str::<Value>(other) {
                Ok(schema) => Ok(Some(schema)),
                Err(_) => Err(Error::invalid_format(other)),
            },
        }
    }
}

/// Terminal status of an [`AgentResponse`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The single terminal outcome of a `query`/`query_stream` invocation
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub status: ResponseStatus,
    /// Normalized content (think-tag stripped on every path)
    pub content: String,
    /// The message list as sent upstream (without the failed turn on errors)
    pub messages: Vec<ConversationMessage>,
    /// The original query text, echoed for correlation
    pub query: String,
}

impl AgentResponse {
    pub fn success(
        content: impl Into<String>,
        messages: Vec<ConversationMessage>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            content: content.into(),
            messages,
            query: query.into(),
        }
    }

    pub fn error(content: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            content: content.into(),
            messages: Vec::new(),
            query: query.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Stream lifecycle event for one in-progress message.
///
/// Events for one message id are delivered strictly in the order
/// `Start → (Chunk)* → End`; every `Chunk` carries the *cumulative* content
/// so far, not just the delta, so each chunk's content is a prefix-extension
/// of the previous one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        message_id: String,
        timestamp: u64,
    },
    Chunk {
        message_id: String,
        content: String,
        timestamp: u64,
    },
    End {
        message_id: String,
        content: String,
        timestamp: u64,
    },
    Ack {
        message_id: String,
        timestamp: u64,
    },
}

impl StreamEvent {
    pub fn start(message_id: impl Into<String>) -> Self {
        StreamEvent::Start {
            message_id: message_id.into(),
            timestamp: now_millis(),
        }
    }

    pub fn chunk(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            message_id: message_id.into(),
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn end(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        StreamEvent::End {
            message_id: message_id.into(),
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn ack(message_id: impl Into<String>) -> Self {
        StreamEvent::Ack {
            message_id: message_id.into(),
            timestamp: now_millis(),
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            StreamEvent::Start { message_id, .. }
            | StreamEvent::Chunk { message_id, .. }
            | StreamEvent::End { message_id, .. }
            | StreamEvent::Ack { message_id, .. } => message_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            StreamEvent::Start { timestamp, .. }
            | StreamEvent::Chunk { timestamp, .. }
            | StreamEvent::End { timestamp, .. }
            | StreamEvent::Ack { timestamp, .. } => *timestamp,
        }
    }
}

/// Event emitted to the agent's collaborator sink
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Stream lifecycle notification
    Message(StreamEvent),
    /// Raw upstream body of a successful whole-response completion
    Completion(Value),
    /// External content ingested by a tool (e.g. an `http_get` fetch)
    Document { id: String, content: String },
}

/// A tool invocation extracted from a terminal model response
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON argument string, parsed by the dispatcher
    pub arguments: String,
    pub call_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire types: /chat/completions envelope
// ---------------------------------------------------------------------------

/// Provider-specific sampling options, passed through opaquely
#[derive(Debug, Clone, Serialize)]
pub struct SamplingOptions {
    pub seed: u64,
    pub temperature: f32,
    pub num_ctx: u32,
}

/// Request body for `POST {path}/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<i64>,
    pub messages: Vec<ConversationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    pub options: SamplingOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    pub stream: bool,
}

/// Non-streaming response body
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    /// 2xx envelope carrying an upstream-reported error
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Tool call as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// One streaming delta event, after SSE framing is stripped
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}
