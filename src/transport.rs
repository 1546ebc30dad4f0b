//! Transport client for the completion endpoint.
//!
//! Owns the HTTP client and the two entry points that share request
//! construction: [`Transport::complete`] (whole response) and
//! [`Transport::stream`] (incremental). Every suspension point (connect,
//! whole-body read, per-chunk read) is raced against the request's
//! cancellation token via [`guard::checked`], so the connection aborts within
//! one I/O operation of the token being cancelled.
//!
//! Failures are kept distinguishable for the caller: connection-level errors
//! ([`Error::Transport`]), non-2xx statuses with the code and a truncated
//! body ([`Error::Status`]), upstream-reported error objects inside a 2xx
//! envelope ([`Error::Upstream`]), and bodies that are not JSON or are
//! missing `choices` ([`Error::MalformedResponse`]).

use crate::config::AgentConfig;
use crate::guard::checked;
use crate::types::{CompletionRequest, CompletionResponse, ConversationMessage, Role, ToolCall};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Outcome of a whole-response completion
#[derive(Debug, Clone)]
pub enum Completion {
    /// The model produced content; `raw` is the full upstream body
    Content { content: String, raw: Value },
    /// The model requested a tool invocation
    ToolCall {
        /// The assistant turn carrying the tool call, for history replay
        assistant: ConversationMessage,
        call: ToolCall,
    },
}

/// HTTP client for a configured primary endpoint
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    completions_url: String,
}

impl Transport {
    /// Build a transport for the configured endpoint; `None` when no host is
    /// configured (the fallback aggregator serves queries instead).
    pub fn from_config(config: &AgentConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.base_url() else {
            return Ok(None);
        };

        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| Error::config(format!("invalid header name {name:?}")))?;
            let value: HeaderValue = value
                .parse()
                .map_err(|_| Error::config(format!("invalid header value for {name:?}")))?;
            headers.insert(name, value);
        }

        // No client-level timeout: deadlines are enforced by the guard so
        // one tolerance covers the whole invocation, tool recursion included.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        let completions_url = format!("{}{}/chat/completions", base_url, config.path);
        Ok(Some(Self {
            http,
            base_url,
            completions_url,
        }))
    }

    /// Issue a whole-response completion and parse the first choice.
    pub async fn complete(
        &self,
        body: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        debug_assert!(!body.stream);

        let response = checked(
            cancel,
            self.http.post(&self.completions_url).json(body).send(),
        )
        .await??;

        let status = response.status();
        let text = checked(cancel, response.text()).await??;

        if !status.is_success() {
            return Err(Error::status(status.as_u16(), &text));
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("body is not valid JSON: {e}")))?;

        let parsed: CompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| Error::malformed(format!("unexpected body shape: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(Error::upstream(error.to_string()));
        }

        let choice = parsed
            .choices
            .as_ref()
            .and_then(|choices| choices.first())
            .ok_or_else(|| Error::malformed("no choices in response"))?;

        if choice.finish_reason.as_deref() == Some("tool_calls") {
            if let Some(wire_call) = choice
                .message
                .tool_calls
                .as_ref()
                .and_then(|calls| calls.first())
            {
                let call = ToolCall {
                    name: wire_call.function.name.clone(),
                    arguments: wire_call.function.arguments.clone(),
                    call_id: wire_call.id.clone(),
                };
                let assistant = ConversationMessage {
                    role: Role::Assistant,
                    content: choice.message.content.clone().unwrap_or_default(),
                    tool_call_id: None,
                    username: None,
                    tool_calls: choice.message.tool_calls.clone(),
                };
                return Ok(Completion::ToolCall { assistant, call });
            }
            return Err(Error::malformed(
                "finish_reason is tool_calls but no tool call present",
            ));
        }

        let content = choice.message.content.clone().unwrap_or_default();
        Ok(Completion::Content { content, raw })
    }

    /// Open a streaming completion; the caller drains the body through the
    /// stream decoder. The response is checked for a non-2xx status before
    /// any bytes are forwarded.
    pub async fn stream(
        &self,
        body: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        debug_assert!(body.stream);

        let response = checked(
            cancel,
            self.http.post(&self.completions_url).json(body).send(),
        )
        .await??;

        let status = response.status();
        if !status.is_success() {
            let text = checked(cancel, response.text()).await??;
            return Err(Error::status(status.as_u16(), &text));
        }

        Ok(response)
    }

    /// `GET /api/v1/models`, unwrapping the `{data: [...]}` envelope.
    pub async fn list_models(&self) -> Result<Vec<Value>> {
        let url = format!("{}/api/v1/models", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::status(status.as_u16(), &text));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("body is not valid JSON: {e}")))?;
        match body.get("data").and_then(Value::as_array) {
            Some(models) => Ok(models.clone()),
            None => Err(Error::malformed("models listing has no data array")),
        }
    }

    /// `GET /api/tags`: provider-native tag listing, passed through raw.
    pub async fn list_tags(&self) -> Result<Value> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::status(status.as_u16(), &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("body is not valid JSON: {e}")))
    }

    /// `POST /api/generate {model}`: readiness warm-up.
    pub async fn prime(&self, model: &str) -> Result<Value> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::status(status.as_u16(), &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::malformed(format!("body is not valid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::types::SamplingOptions;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn transport_for(server: &MockServer) -> Transport {
        let config = AgentConfig::builder()
            .host(server.address().ip().to_string())
            .port(server.address().port())
            .build()
            .unwrap();
        Transport::from_config(&config).unwrap().unwrap()
    }

    fn request_body(stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: "llama3.2".to_string(),
            keep_alive: None,
            messages: vec![
                ConversationMessage::system("sys"),
                ConversationMessage::user("hi"),
            ],
            format: None,
            options: SamplingOptions {
                seed: 42,
                temperature: 0.0,
                num_ctx: 131072,
            },
            tools: None,
            stream,
        }
    }

    #[test]
    fn test_no_host_yields_no_transport() {
        let config = AgentConfig::builder().build().unwrap();
        assert!(Transport::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = AgentConfig::builder()
            .host("localhost")
            .header("bad header name", "x")
            .build()
            .unwrap();
        assert!(matches!(
            Transport::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_extracts_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Paris"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let completion = transport.complete(&request_body(false), &cancel).await.unwrap();

        match completion {
            Completion::Content { content, raw } => {
                assert_eq!(content, "Paris");
                assert!(raw["choices"].is_array());
            }
            other => panic!("expected Content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_surfaces_status_with_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("y".repeat(1000)))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let err = transport
            .complete(&request_body(false), &cancel)
            .await
            .unwrap_err();

        match err {
            Error::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), 200);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_surfaces_upstream_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "model not found"}
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let err = transport
            .complete(&request_body(false), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(msg) if msg.contains("model not found")));
    }

    #[tokio::test]
    async fn test_complete_rejects_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let err = transport
            .complete(&request_body(false), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_rejects_missing_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let err = transport
            .complete(&request_body(false), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_extracts_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "tool_calls": [{
                            "id": "call_1",
                            "function": {"name": "http_get", "arguments": "{\"url\":\"http://x\"}"}
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        let completion = transport.complete(&request_body(false), &cancel).await.unwrap();

        match completion {
            Completion::ToolCall { assistant, call } => {
                assert_eq!(call.name, "http_get");
                assert_eq!(call.call_id.as_deref(), Some("call_1"));
                assert_eq!(assistant.role, Role::Assistant);
                assert!(assistant.tool_calls.is_some());
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_secs(10))
                    .set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport
            .complete(&request_body(false), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_list_models_unwraps_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "llama3.2"}, {"id": "qwen2.5"}]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let models = transport.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], "llama3.2");
    }

    #[tokio::test]
    async fn test_list_tags_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3.2:latest"}]
            })))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let tags = transport.list_tags().await.unwrap();
        assert_eq!(tags["models"][0]["name"], "llama3.2:latest");
    }

    #[tokio::test]
    async fn test_prime_posts_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "llama3.2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let primed = transport.prime("llama3.2").await.unwrap();
        assert_eq!(primed["done"], true);
    }
}
