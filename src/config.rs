//! Agent configuration.
//!
//! [`AgentConfig`] is immutable after construction and owned by the
//! [`Agent`](crate::Agent); the only mutable piece of agent state is the
//! system prompt, which lives on the agent itself and may be swapped between
//! requests. When no `host` is configured the agent has no primary endpoint
//! and every query is served by the fallback aggregator instead.

use crate::fallback::FallbackProvider;
use crate::tools::Tool;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default completion endpoint port (Ollama)
pub const DEFAULT_PORT: u16 = 11434;

/// Default OpenAI-compatible API path prefix
pub const DEFAULT_PATH: &str = "/v1";

/// Fixed default sampling seed for reproducible completions
pub const DEFAULT_SEED: u64 = 42;

/// Default sampling temperature (deterministic)
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Default context window, in tokens (128k)
pub const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 8192 * 16;

/// Default deadline tolerance per query
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(60);

/// Default bound on tool-call recursion depth
pub const DEFAULT_MAX_TOOL_DEPTH: u32 = 3;

/// Default system prompt
pub const DEFAULT_PROMPT: &str =
    "You are a helpful assistant.  Answer from the provided context and \
     conversation history; do not rely on hypothetical information.";

/// Immutable-after-construction agent configuration
#[derive(Clone)]
pub struct AgentConfig {
    /// Agent name, used for log attribution
    pub name: String,
    /// Completion endpoint host; `None` activates the fallback aggregator
    pub host: Option<String>,
    pub port: u16,
    /// Use `https` instead of `http`
    pub secure: bool,
    /// API path prefix, e.g. `/v1`
    pub path: String,
    /// Default model id
    pub model: String,
    /// Initial system prompt
    pub prompt: String,
    /// Header overrides applied to every completion request
    pub headers: Vec<(String, String)>,
    pub seed: u64,
    pub temperature: f32,
    /// Passed through as `options.num_ctx`
    pub max_context_tokens: u32,
    /// Request `keep_alive: -1` (hold the model resident)
    pub keep_alive: bool,
    /// Deadline applied to every `query`/`query_stream` invocation
    pub tolerance: Duration,
    /// When disabled, `query_stream` degrades to the whole-response path
    pub streaming: bool,
    /// Bound on tool-call recursion
    pub max_tool_depth: u32,
    /// Tool registry offered to the model when a request enables tools
    pub tools: Vec<Arc<Tool>>,
    /// Secondary providers, in priority order
    pub fallbacks: Vec<Arc<dyn FallbackProvider>>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("path", &self.path)
            .field("model", &self.model)
            .field("seed", &self.seed)
            .field("temperature", &self.temperature)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("keep_alive", &self.keep_alive)
            .field("tolerance", &self.tolerance)
            .field("streaming", &self.streaming)
            .field("max_tool_depth", &self.max_tool_depth)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("fallbacks", &format!("{} providers", self.fallbacks.len()))
            .finish()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            host: None,
            port: DEFAULT_PORT,
            secure: false,
            path: DEFAULT_PATH.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            headers: Vec::new(),
            seed: DEFAULT_SEED,
            temperature: DEFAULT_TEMPERATURE,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            keep_alive: false,
            tolerance: DEFAULT_TOLERANCE,
            streaming: true,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            tools: Vec::new(),
            fallbacks: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Create a new builder for AgentConfig
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// `scheme://host:port` of the primary endpoint, `None` without a host
    pub fn base_url(&self) -> Option<String> {
        self.host.as_ref().map(|host| {
            format!(
                "http{}://{}:{}",
                if self.secure { "s" } else { "" },
                host,
                self.port
            )
        })
    }

    /// Completion endpoint URL (`base_url` + path + `/chat/completions`)
    pub fn completions_url(&self) -> Option<String> {
        self.base_url()
            .map(|base| format!("{}{}/chat/completions", base, self.path))
    }
}

/// Builder for AgentConfig
#[derive(Default)]
pub struct AgentConfigBuilder {
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    secure: Option<bool>,
    path: Option<String>,
    model: Option<String>,
    prompt: Option<String>,
    headers: Vec<(String, String)>,
    seed: Option<u64>,
    temperature: Option<f32>,
    max_context_tokens: Option<u32>,
    keep_alive: Option<bool>,
    tolerance: Option<Duration>,
    streaming: Option<bool>,
    max_tool_depth: Option<u32>,
    tools: Vec<Arc<Tool>>,
    fallbacks: Vec<Arc<dyn FallbackProvider>>,
}

impl AgentConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_context_tokens(mut self, tokens: u32) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    pub fn max_tool_depth(mut self, depth: u32) -> Self {
        self.max_tool_depth = Some(depth);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools.into_iter().map(Arc::new));
        self
    }

    pub fn fallback(mut self, provider: Arc<dyn FallbackProvider>) -> Self {
        self.fallbacks.push(provider);
        self
    }

    pub fn build(self) -> Result<AgentConfig> {
        let path = self.path.unwrap_or_else(|| DEFAULT_PATH.to_string());
        if !path.is_empty() && !path.starts_with('/') {
            return Err(Error::config(format!(
                "path must start with '/', got {path:?}"
            )));
        }

        let tolerance = self.tolerance.unwrap_or(DEFAULT_TOLERANCE);
        if tolerance.is_zero() {
            return Err(Error::config("tolerance must be non-zero"));
        }

        Ok(AgentConfig {
            name: self.name.unwrap_or_else(|| "agent".to_string()),
            host: self.host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            secure: self.secure.unwrap_or(false),
            path,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt: self.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            headers: self.headers,
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_context_tokens: self
                .max_context_tokens
                .unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS),
            keep_alive: self.keep_alive.unwrap_or(false),
            tolerance,
            streaming: self.streaming.unwrap_or(true),
            max_tool_depth: self.max_tool_depth.unwrap_or(DEFAULT_MAX_TOOL_DEPTH),
            tools: self.tools,
            fallbacks: self.fallbacks,
        })
    }
}
