//! Error types for the agent orchestration core.
//!
//! The taxonomy distinguishes every failure class a caller may want to react
//! to differently: deadline expiry, connection-level failures, non-2xx
//! upstream statuses (with the status code and a truncated body preserved for
//! diagnostics), error objects reported inside a 2xx envelope, malformed
//! bodies, tool lookup/recursion failures, and invalid caller-supplied format
//! specifiers. There is no retry machinery here; retry policy belongs to the
//! caller.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of bytes of an upstream error body kept for diagnostics.
pub(crate) const ERROR_BODY_LIMIT: usize = 200;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Deadline exceeded before a terminal outcome was produced
    #[error("Query timed out")]
    Timeout,

    /// Connection-level HTTP failure (DNS, connect, reset, ...)
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream returned a non-2xx status
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream returned a 2xx envelope containing an error object
    #[error("Upstream reported error: {0}")]
    Upstream(String),

    /// Response body was not valid JSON, or was missing required fields
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Model requested a tool that is not in the registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool-call recursion exceeded the configured depth
    #[error("Tool recursion exhausted after {0} levels")]
    ToolRecursionExhausted(u32),

    /// Caller-supplied format specifier was not `json` or a valid JSON schema
    #[error("Invalid format specified: {0}")]
    InvalidFormat(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Tool execution failure
    #[error("Tool execution error: {0}")]
    Tool(String),
}

impl Error {
    /// Create a new upstream-status error, truncating the body for diagnostics
    pub fn status(status: u16, body: &str) -> Self {
        let truncated: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        Error::Status {
            status,
            body: truncated,
        }
    }

    /// Create a new upstream-reported error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into())
    }

    /// Create a new malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid-format error
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// True for the narrow set of errors surfaced as rejected outcomes
    /// instead of an `AgentResponse { status: error }` (see `Agent::query`).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Timeout | Error::InvalidFormat(_))
    }
}
