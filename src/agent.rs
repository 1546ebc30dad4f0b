//! The agent orchestrator.
//!
//! [`Agent`] ties the pipeline together: the assembler builds the message
//! list, the transport talks to the completion endpoint, the decoder turns a
//! streaming body into cumulative chunks, the guard bounds the whole
//! invocation with one deadline, and the normalizer strips reasoning tags
//! from anything the caller sees. Tool-call dispatch and the fallback
//! aggregator both live behind the same two entry points, [`Agent::query`]
//! and [`Agent::query_stream`].
//!
//! Construction returns the agent together with an event receiver; the agent
//! owns the sender and emits [`AgentEvent`]s (stream lifecycle, raw
//! completion bodies, tool-fetched documents) for collaborators to observe.
//! Dropping the receiver is harmless; emission is fire-and-forget.
//!
//! The only mutable state is the system prompt, which may be swapped between
//! requests; concurrent queries are otherwise fully independent.

use crate::assembler::assemble;
use crate::config::AgentConfig;
use crate::decoder::{DecodeEvent, StreamDecoder};
use crate::fallback;
use crate::guard::{checked, with_deadline};
use crate::normalizer::strip_think_tags;
use crate::tools;
use crate::transport::{Completion, Transport};
use crate::types::{
    AgentEvent, AgentResponse, CompletionRequest, ConversationMessage, QueryRequest,
    SamplingOptions, StreamEvent,
};
use crate::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Query orchestrator for one configured completion endpoint.
pub struct Agent {
    config: AgentConfig,
    /// Swappable between requests; last write wins
    prompt: RwLock<String>,
    /// `None` when no host is configured; queries go to the fallbacks
    transport: Option<Transport>,
    events: UnboundedSender<AgentEvent>,
}

impl Agent {
    /// Build an agent and the receiving end of its event sink.
    pub fn new(config: AgentConfig) -> Result<(Self, UnboundedReceiver<AgentEvent>)> {
        let transport = Transport::from_config(&config)?;
        let (events, receiver) = unbounded_channel();
        let prompt = RwLock::new(config.prompt.clone());
        Ok((
            Self {
                config,
                prompt,
                transport,
                events,
            },
            receiver,
        ))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Current system prompt
    pub async fn prompt(&self) -> String {
        self.prompt.read().await.clone()
    }

    /// Swap the system prompt for subsequent requests.
    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write().await = prompt.into();
    }

    /// Run one query to a single terminal outcome.
    ///
    /// Internal failures resolve as `AgentResponse { status: Error }` with
    /// the failure text as content. Only deadline expiry and an invalid
    /// format specifier are returned as `Err`.
    pub async fn query(&self, request: QueryRequest) -> Result<AgentResponse> {
        self.query_with_tolerance(request, self.config.tolerance)
            .await
    }

    /// Re-run a query under a caller-supplied deadline.
    pub async fn requery(
        &self,
        request: QueryRequest,
        tolerance: Duration,
    ) -> Result<AgentResponse> {
        self.query_with_tolerance(request, tolerance).await
    }

    async fn query_with_tolerance(
        &self,
        request: QueryRequest,
        tolerance: Duration,
    ) -> Result<AgentResponse> {
        let cancel = request.cancel.clone().unwrap_or_default();
        let outcome =
            with_deadline(tolerance, &cancel, self.query_inner(&request, &cancel)).await;
        self.finalize(outcome, &request, false)
    }

    /// Run one query, emitting stream lifecycle events as content arrives.
    ///
    /// Exactly one `Start`, zero or more cumulative `Chunk`s, and exactly one
    /// `End` are emitted per message id, to the agent sink and, when the
    /// request carries one, the per-request channel. When streaming is
    /// disabled, no host is configured, or the request offers tools (tool
    /// dispatch needs the whole-response envelope), the query degrades to the
    /// whole-response path and still emits `Start`/`End`.
    pub async fn query_stream(&self, request: QueryRequest) -> Result<AgentResponse> {
        let cancel = request.cancel.clone().unwrap_or_default();
        let message_id = match &request.message_id {
            Some(id) => {
                // An identified inbound message is acknowledged up front
                self.emit_stream(&request, StreamEvent::ack(id));
                id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };

        let outcome = with_deadline(
            self.config.tolerance,
            &cancel,
            self.stream_inner(&request, &cancel, &message_id),
        )
        .await;
        self.finalize(outcome, &request, true)
    }

    /// Warm the configured model up. Fire-and-forget: failures are logged,
    /// never propagated; a no-op without a host.
    pub async fn prime(&self) {
        let Some(transport) = &self.transport else {
            return;
        };
        match transport.prime(&self.config.model).await {
            Ok(_) => log::debug!("agent {}: primed model {}", self.config.name, self.config.model),
            Err(e) => log::warn!("agent {}: prime failed: {e}", self.config.name),
        }
    }

    /// Models advertised by the endpoint (`GET /api/v1/models`).
    pub async fn list_models(&self) -> Result<Vec<Value>> {
        match &self.transport {
            Some(transport) => transport.list_models().await,
            None => Err(Error::config("no endpoint configured")),
        }
    }

    /// Provider-native tag listing (`GET /api/tags`), passed through raw.
    pub async fn list_tags(&self) -> Result<Value> {
        match &self.transport {
            Some(transport) => transport.list_tags().await,
            None => Err(Error::config("no endpoint configured")),
        }
    }

    /// Map an internal outcome to the caller-facing contract.
    ///
    /// Rejections (deadline expiry, invalid format) pass through as `Err`.
    /// On the streaming path a transport-level failure is fatal to the stream
    /// and also surfaced as `Err`; everything else resolves as an
    /// error-status response so a calling service always has content to
    /// render.
    fn finalize(
        &self,
        outcome: Result<AgentResponse>,
        request: &QueryRequest,
        streaming: bool,
    ) -> Result<AgentResponse> {
        match outcome {
            Ok(response) => Ok(response),
            Err(e) if e.is_rejection() => Err(e),
            Err(e @ Error::Transport(_)) if streaming => Err(e),
            Err(e) => {
                log::warn!("agent {}: query failed: {e}", self.config.name);
                Ok(AgentResponse::error(e.to_string(), &request.query))
            }
        }
    }

    async fn query_inner(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let format = request.resolved_format()?;
        let prompt = self.prompt.read().await.clone();
        let mut messages = assemble(
            &request.messages,
            &prompt,
            request.context.as_ref(),
            &request.query,
            request.username.as_deref(),
        );

        let Some(transport) = &self.transport else {
            let reply = fallback::aggregate(&self.config.fallbacks, &messages).await;
            let content = strip_think_tags(&reply);
            return Ok(AgentResponse::success(content, messages, &request.query));
        };

        let manifest = if request.tools {
            tools::manifest(&self.config.tools)
        } else {
            None
        };

        let mut depth = 0u32;
        loop {
            let body =
                self.completion_body(request, messages.clone(), format.clone(), manifest.clone(), false);

            match transport.complete(&body, cancel).await? {
                Completion::Content { content, raw } => {
                    self.emit(AgentEvent::Completion(raw));
                    let content = strip_think_tags(&content);
                    return Ok(AgentResponse::success(content, messages, &request.query));
                }
                Completion::ToolCall { assistant, call } => {
                    if depth >= self.config.max_tool_depth {
                        return Err(Error::ToolRecursionExhausted(depth));
                    }
                    depth += 1;

                    let tool = tools::lookup(&self.config.tools, &call.name)?;
                    let arguments: Value = serde_json::from_str(&call.arguments)?;
                    log::debug!(
                        "agent {}: dispatching tool {} (depth {depth})",
                        self.config.name,
                        call.name
                    );
                    let output = checked(cancel, tool.execute(arguments)).await??;

                    self.emit(AgentEvent::Document {
                        id: Uuid::new_v4().to_string(),
                        content: output.clone(),
                    });

                    // Replay the tool-call turn and its result, then re-issue
                    messages.push(assistant);
                    messages.push(ConversationMessage::tool(output, call.call_id));
                }
            }
        }
    }

    async fn stream_inner(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
        message_id: &str,
    ) -> Result<AgentResponse> {
        let streamable =
            self.transport.is_some() && self.config.streaming && !request.tools;
        if !streamable {
            self.emit_stream(request, StreamEvent::start(message_id));
            let response = self.query_inner(request, cancel).await?;
            self.emit_stream(
                request,
                StreamEvent::end(message_id, response.content.clone()),
            );
            return Ok(response);
        }

        // streamable implies a transport
        let Some(transport) = &self.transport else {
            return Err(Error::config("no endpoint configured"));
        };

        let format = request.resolved_format()?;
        let prompt = self.prompt.read().await.clone();
        let messages = assemble(
            &request.messages,
            &prompt,
            request.context.as_ref(),
            &request.query,
            request.username.as_deref(),
        );

        let body = self.completion_body(request, messages.clone(), format, None, true);
        let mut response = transport.stream(&body, cancel).await?;

        self.emit_stream(request, StreamEvent::start(message_id));

        let mut decoder = StreamDecoder::new();
        let content = loop {
            let chunk = checked(cancel, response.chunk()).await??;
            match chunk {
                Some(bytes) => {
                    let mut terminal = None;
                    for event in decoder.push(&bytes) {
                        match event {
                            DecodeEvent::Content(cumulative) => self.emit_stream(
                                request,
                                StreamEvent::chunk(message_id, cumulative),
                            ),
                            DecodeEvent::Done(content) => terminal = Some(content),
                        }
                    }
                    if let Some(content) = terminal {
                        break content;
                    }
                }
                None => match decoder.finish() {
                    Some(DecodeEvent::Done(content)) => break content,
                    _ => break strip_think_tags(decoder.cumulative()),
                },
            }
        };

        self.emit_stream(request, StreamEvent::end(message_id, content.clone()));
        Ok(AgentResponse::success(content, messages, &request.query))
    }

    fn completion_body(
        &self,
        request: &QueryRequest,
        messages: Vec<ConversationMessage>,
        format: Option<Value>,
        tools: Option<Vec<Value>>,
        stream: bool,
    ) -> CompletionRequest {
        CompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            keep_alive: self.config.keep_alive.then_some(-1),
            messages,
            format,
            options: SamplingOptions {
                seed: request.seed.unwrap_or(self.config.seed),
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_ctx: self.config.max_context_tokens,
            },
            tools,
            stream,
        }
    }

    fn emit(&self, event: AgentEvent) {
        // Fire-and-forget: a dropped receiver never fails a query
        let _ = self.events.send(event);
    }

    fn emit_stream(&self, request: &QueryRequest, event: StreamEvent) {
        if let Some(sender) = &request.events {
            let _ = sender.send(event.clone());
        }
        self.emit(AgentEvent::Message(event));
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .finish()
    }
}
