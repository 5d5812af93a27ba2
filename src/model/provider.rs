//! Model provider transport.
//!
//! The workflow core is agnostic to the concrete vendor: it talks to a
//! [`ModelProvider`] implementation. The HTTP provider below speaks the
//! logical invoke contract (JSON request, `content`/`usage` envelope) and
//! classifies transport failures into the error taxonomy. Credentials are
//! ambient (injected by the deployment environment), never handled here.

use crate::{
    error::{AgentFlowError, Result},
    model::{ModelContent, ModelRequest, ModelResponse, TokenUsage},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Abstraction over the model backend.
///
/// Implementations must be safe for concurrent invocations; per-call state
/// lives on the stack.
#[async_trait]
pub trait ModelProvider: Send + Sync + std::fmt::Debug {
    /// Submit one request and return the structured response.
    ///
    /// Implementations classify every failure into the error taxonomy:
    /// throttles and network/5xx-class faults as retryable kinds, auth and
    /// unknown-model failures as fatal.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Configuration for the HTTP model provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Invoke endpoint URL
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Connection pool ceiling per host
    pub max_connections: usize,
}

impl HttpProviderConfig {
    /// Configuration for a given endpoint with default limits
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(300),
            max_connections: 16,
        }
    }

    /// Configuration for the managed runtime in the given region
    pub fn for_region(region: &str) -> Self {
        Self::new(format!(
            "https://bedrock-runtime.{region}.amazonaws.com/invoke"
        ))
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection pool ceiling
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// HTTP transport for the model invoke endpoint
#[derive(Debug)]
pub struct HttpModelProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpModelProvider {
    /// Create a provider from configuration
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections)
            .user_agent("agentflow/0.1")
            .build()
            .map_err(|e| {
                AgentFlowError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    fn request_body(request: &ModelRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model.model_id(),
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if let Some(system) = &request.system_prompt {
            body["system"] = serde_json::Value::String(system.clone());
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(&request.tools).unwrap_or_default();
        }
        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] =
                serde_json::to_value(&request.stop_sequences).unwrap_or_default();
        }

        body
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = Self::request_body(request);

        debug!(
            model = request.model.model_id(),
            endpoint = %self.config.endpoint,
            "submitting model request"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        let envelope: ProviderEnvelope = response.json().await.map_err(|e| {
            AgentFlowError::model_fatal(format!("malformed provider response: {e}"))
        })?;

        envelope.into_response()
    }
}

/// Response envelope returned by the invoke endpoint
#[derive(Debug, Deserialize)]
struct ProviderEnvelope {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: TokenUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

impl ProviderEnvelope {
    fn into_response(self) -> Result<ModelResponse> {
        let content = match self.content.into_iter().next() {
            Some(ContentBlock::Text { text }) => ModelContent::Text { text },
            Some(ContentBlock::ToolUse { name, input }) => ModelContent::ToolUse { name, input },
            None => {
                return Err(AgentFlowError::model_fatal(
                    "provider returned empty content",
                ))
            }
        };

        Ok(ModelResponse {
            content,
            usage: self.usage,
            stop_reason: self.stop_reason,
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> AgentFlowError {
    if err.is_timeout() {
        AgentFlowError::model_transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        AgentFlowError::model_transient(format!("connection failed: {err}"))
    } else {
        AgentFlowError::model_transient(format!("transport error: {err}"))
    }
}

fn classify_status(status: reqwest::StatusCode, detail: &str) -> AgentFlowError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AgentFlowError::throttled(format!("provider throttled the request: {detail}"))
    } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        AgentFlowError::model_transient(format!("provider returned {status}: {detail}"))
    } else {
        AgentFlowError::model_fatal(format!("provider returned {status}: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelType;
    use crate::types::ChatMessage;

    #[test]
    fn test_status_classification() {
        let throttle = classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(throttle.kind(), "model_invocation_throttle");

        let transient = classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(transient.kind(), "model_invocation_transient");
        assert!(transient.is_retryable());

        let fatal = classify_status(reqwest::StatusCode::UNAUTHORIZED, "no credentials");
        assert_eq!(fatal.kind(), "model_invocation_fatal");
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn test_envelope_text() {
        let envelope: ProviderEnvelope = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "hello"}],
            "usage": {"input_tokens": 12, "output_tokens": 3},
            "stop_reason": "end_turn"
        }))
        .unwrap();

        let response = envelope.into_response().unwrap();
        assert!(matches!(
            response.content,
            ModelContent::Text { ref text } if text == "hello"
        ));
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[test]
    fn test_envelope_tool_use() {
        let envelope: ProviderEnvelope = serde_json::from_value(serde_json::json!({
            "content": [{"type": "tool_use", "name": "search", "input": {"query": "rust"}}],
            "usage": {"input_tokens": 5, "output_tokens": 7}
        }))
        .unwrap();

        let response = envelope.into_response().unwrap();
        match response.content {
            ModelContent::ToolUse { name, input } => {
                assert_eq!(name, "search");
                assert_eq!(input["query"], "rust");
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_content_is_fatal() {
        let envelope: ProviderEnvelope =
            serde_json::from_value(serde_json::json!({ "content": [] })).unwrap();
        let err = envelope.into_response().unwrap_err();
        assert_eq!(err.kind(), "model_invocation_fatal");
    }

    #[test]
    fn test_request_body_shape() {
        let request = ModelRequest {
            model: ModelType::Haiku45,
            messages: vec![ChatMessage::user("hi")],
            system_prompt: Some("be brief".to_string()),
            temperature: 0.2,
            max_tokens: 128,
            tools: vec![],
            stop_sequences: vec!["END".to_string()],
        };

        let body = HttpModelProvider::request_body(&request);
        assert_eq!(body["model"], ModelType::Haiku45.model_id());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["stop_sequences"][0], "END");
        assert!(body.get("tools").is_none());
    }
}
