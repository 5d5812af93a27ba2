//! Model client: typed requests, model routing, and fault-tolerant
//! invocation over a [`ModelProvider`] backend.

use crate::{
    error::{AgentFlowError, Result},
    types::{ChatMessage, RetryPolicy, ToolSchema},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod provider;

pub use provider::{HttpModelProvider, HttpProviderConfig, ModelProvider};

/// Supported model selectors.
///
/// The selector-to-model-id mapping is a closed table; adding a model is a
/// code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Capable reasoning model
    #[serde(rename = "sonnet-4-5")]
    Sonnet45,
    /// Fast, inexpensive model
    #[serde(rename = "haiku-4-5")]
    Haiku45,
    /// Open-weights alternative
    #[serde(rename = "qwen-3-32b")]
    Qwen32B,
}

/// Task complexity used for model routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    /// Routine task; route to the fast model
    Simple,
    /// Task needing stronger reasoning; route to the capable model
    Complex,
}

impl ModelType {
    /// Provider-native model identifier
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Sonnet45 => "us.anthropic.claude-sonnet-4-5-20250929-v1:0",
            Self::Haiku45 => "us.anthropic.claude-haiku-4-5-20251001-v1:0",
            Self::Qwen32B => "qwen.qwen3-32b-v1:0",
        }
    }

    /// Select a model for the given task complexity. This is the single
    /// routing decision point.
    pub fn for_complexity(complexity: TaskComplexity) -> Self {
        match complexity {
            TaskComplexity::Simple => Self::Haiku45,
            TaskComplexity::Complex => Self::Sonnet45,
        }
    }
}

/// A fully-specified model invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model selector
    pub model: ModelType,
    /// Conversation messages, oldest first
    pub messages: Vec<ChatMessage>,
    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Tool schemas advertised to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    /// Sequences that stop generation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request
    #[serde(default)]
    pub input_tokens: u64,
    /// Tokens generated in the response
    #[serde(default)]
    pub output_tokens: u64,
}

/// Structured model response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelContent {
    /// Plain text response
    Text {
        /// The generated text
        text: String,
    },
    /// Tool-call instruction emitted by the model
    ToolUse {
        /// Requested tool name
        name: String,
        /// Tool arguments
        input: serde_json::Value,
    },
}

/// Model response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Response payload
    pub content: ModelContent,
    /// Token accounting
    pub usage: TokenUsage,
    /// Why generation stopped, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Fault-tolerant client over a model provider.
///
/// Shared across agents and safe for concurrent invocations; per-attempt
/// state lives on the stack. Transient and throttle failures are recovered
/// locally with capped, jittered exponential backoff; fatal failures
/// surface immediately.
#[derive(Debug, Clone)]
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
}

impl ModelClient {
    /// Create a client with the default retry policy
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The active retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Select a model for the given task complexity
    pub fn pick_model(&self, complexity: TaskComplexity) -> ModelType {
        ModelType::for_complexity(complexity)
    }

    /// Invoke the model, retrying transient failures.
    ///
    /// Cancellation aborts both in-between backoff waits and new attempts.
    pub async fn invoke(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentFlowError::Cancelled);
            }

            match self.provider.invoke(request).await {
                Ok(response) => {
                    debug!(
                        model = request.model.model_id(),
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "model invocation succeeded"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.jittered_delay(attempt);
                    warn!(
                        model = request.model.model_id(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "model invocation failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(AgentFlowError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
