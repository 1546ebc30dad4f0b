//! # Palaver
//!
//! An agent query orchestration library for local OpenAI-compatible
//! completion servers (Ollama, LM Studio, llama.cpp, vLLM).
//!
//! ## Overview
//!
//! Palaver turns a raw query plus conversation history into a single terminal
//! outcome against a configured completion endpoint, handling everything in
//! between:
//!
//! - **Message assembly**: exactly one leading system message, optional
//!   structured context rendered into it, the new user turn appended last
//! - **Streaming**: incremental decoding of line-delimited / SSE-framed
//!   bodies into cumulative content chunks, tolerant of arbitrary byte splits
//! - **Tool calling**: register tools, let the model invoke them, results are
//!   fed back and the query re-issued under a bounded recursion depth
//! - **Deadlines**: one tolerance bounds each invocation; expiry cancels the
//!   in-flight transport work
//! - **Fallbacks**: without a primary endpoint, queries fan out to secondary
//!   providers and the first usable answer (in priority order) wins
//! - **Normalization**: `<think>...</think>` reasoning segments are stripped
//!   from everything the caller sees
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use palaver::{Agent, AgentConfig, QueryRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::builder()
//!         .host("localhost")
//!         .model("llama3.2")
//!         .prompt("You are a helpful assistant.")
//!         .build()?;
//!
//!     let (agent, mut events) = Agent::new(config)?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("event: {event:?}");
//!         }
//!     });
//!
//!     let response = agent
//!         .query(QueryRequest::new("What's the capital of France?"))
//!         .await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use palaver::{Agent, AgentConfig, QueryRequest, StreamEvent};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::builder().host("localhost").build()?;
//!     let (agent, _events) = Agent::new(config)?;
//!
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let handle = tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             if let StreamEvent::Chunk { content, .. } = event {
//!                 // Each chunk carries the cumulative content so far
//!                 print!("\r{content}");
//!             }
//!         }
//!     });
//!
//!     let response = agent
//!         .query_stream(QueryRequest::new("Tell me a story.").with_events(tx))
//!         .await?;
//!     handle.await?;
//!     println!("\nfinal: {}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the orchestrator tying the pipeline together
//! - **assembler**: pure message-list construction
//! - **transport**: HTTP client for the completion endpoint
//! - **decoder**: incremental stream decoder state machine
//! - **tools**: tool registry and the built-in `http_get` capability
//! - **guard**: deadline and cancellation plumbing
//! - **fallback**: secondary-provider aggregation
//! - **normalizer**: think-tag stripping
//! - **types** / **config** / **error**: the data model

mod agent;
mod assembler;
mod config;
mod decoder;
mod error;
mod fallback;
mod guard;
mod normalizer;
mod tools;
mod transport;
mod types;

// --- Orchestrator ---

pub use agent::Agent;

// --- Configuration ---

pub use config::{
    AgentConfig, AgentConfigBuilder, DEFAULT_MAX_CONTEXT_TOKENS, DEFAULT_MAX_TOOL_DEPTH,
    DEFAULT_MODEL, DEFAULT_PATH, DEFAULT_PORT, DEFAULT_PROMPT, DEFAULT_SEED, DEFAULT_TEMPERATURE,
    DEFAULT_TOLERANCE,
};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Streaming Internals ---
//
// Exposed so callers can decode completion bodies they obtained elsewhere.

pub use decoder::{DecodeEvent, DecoderState, StreamDecoder};

// --- Fallbacks ---

pub use fallback::{FallbackProvider, INSUFFICIENT_RESOURCES};

// --- Normalization ---

pub use normalizer::strip_think_tags;

// --- Tool System ---

pub use tools::{Tool, ToolHandler};

// --- Core Types ---

pub use types::{
    AgentEvent, AgentResponse, ConversationMessage, QueryRequest, ResponseStatus, Role,
    StreamEvent, ToolCall,
};

/// Convenience module containing the most commonly used types.
/// Import with `use palaver::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentConfig, AgentEvent, AgentResponse, ConversationMessage, Error,
        FallbackProvider, QueryRequest, ResponseStatus, Result, Role, StreamEvent, Tool,
    };
}
