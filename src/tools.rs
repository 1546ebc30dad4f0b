//! Tool registry and built-in capabilities.
//!
//! A [`Tool`] pairs the manifest the model sees (name, description, JSON
//! schema parameters) with an async handler executed when the model requests
//! it. Handlers are type-erased (`Pin<Box<dyn Future>>` behind an `Arc`) so
//! tools of different concrete types share one registry and can be invoked
//! concurrently.
//!
//! Dispatch itself (detecting the `tool_calls` terminal condition, appending
//! the result to history, re-issuing the query) lives in
//! [`agent`](crate::agent); this module only knows how to describe and run a
//! single tool.

use crate::{Error, Result};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased async tool handler: JSON arguments in, text content out.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// A named capability the model may invoke
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    /// JSON schema for the arguments object
    parameters: Value,
    handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl Tool {
    /// Create a tool from its manifest pieces and handler.
    ///
    /// ```rust,no_run
    /// use palaver::Tool;
    /// use serde_json::json;
    ///
    /// let echo = Tool::new(
    ///     "echo",
    ///     "Echo the input back",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {"text": {"type": "string"}},
    ///         "required": ["text"]
    ///     }),
    ///     |args| Box::pin(async move {
    ///         Ok(args["text"].as_str().unwrap_or_default().to_string())
    ///     }),
    /// );
    /// ```
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Pin<Box<dyn Future<Output = Result<String>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    /// Built-in capability: perform an HTTP GET and return the body text.
    pub fn http_get() -> Self {
        Self::new(
            "http_get",
            "Perform an HTTP GET request.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch."
                    }
                },
                "required": ["url"]
            }),
            |args| {
                Box::pin(async move {
                    let url = args["url"]
                        .as_str()
                        .ok_or_else(|| Error::tool("http_get requires a string `url`"))?
                        .to_string();
                    let response = reqwest::get(&url).await?;
                    Ok(response.text().await?)
                })
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Execute the tool with parsed JSON arguments
    pub async fn execute(&self, arguments: Value) -> Result<String> {
        (self.handler)(arguments).await
    }

    /// Manifest entry in the wire format the completion endpoint expects
    pub fn to_manifest(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Look a tool up by name; unknown names fail dispatch immediately.
pub fn lookup<'a>(tools: &'a [Arc<Tool>], name: &str) -> Result<&'a Arc<Tool>> {
    tools
        .iter()
        .find(|t| t.name() == name)
        .ok_or_else(|| Error::UnknownTool(name.to_string()))
}

/// Wire manifest for the whole registry; `None` when no tools are registered.
pub fn manifest(tools: &[Arc<Tool>]) -> Option<Vec<Value>> {
    if tools.is_empty() {
        None
    } else {
        Some(tools.iter().map(|t| t.to_manifest()).collect())
    }
}
