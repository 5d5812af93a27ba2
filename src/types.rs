//! Core types and data structures shared across the AgentFlow framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for agents
pub type AgentId = Uuid;

/// Unique identifier for workflows
pub type WorkflowId = Uuid;

/// Message role in a model conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant/model message
    Assistant,
    /// Result of a tool invocation fed back to the model
    ToolResult,
}

/// A single message in a model conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a tool-result message
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::ToolResult,
            content: content.into(),
        }
    }
}

/// Tool schema definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input schema (JSON Schema)
    pub input_schema: serde_json::Value,
}

impl ToolSchema {
    /// Create a schema with an unconstrained object input
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object" }),
        }
    }

    /// Set the input schema
    #[must_use]
    pub fn with_input_schema(mut self, input_schema: serde_json::Value) -> Self {
        self.input_schema = input_schema;
        self
    }
}

/// Outcome of a tool handler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// JSON-shaped return value, or the captured error message
    pub content: serde_json::Value,
    /// Whether the handler failed
    pub is_error: bool,
}

impl ToolOutput {
    /// Create a successful tool output
    pub fn success(content: serde_json::Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Create a failed tool output carrying the handler error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::Value::String(message.into()),
            is_error: true,
        }
    }
}

/// Exponential-backoff retry policy.
///
/// Used by the model client and the agent layer; the scheduler carries its
/// own step/workflow retry budgets so the three layers compose as
/// independent knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first one
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single backoff wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay for a zero-based retry index: `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Backoff delay with equal jitter: half the exponential delay plus a
    /// random share of the other half.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let delay = self.delay_for(attempt);
        let half_ms = delay.as_millis() as u64 / 2;
        if half_ms == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=half_ms);
        Duration::from_millis(half_ms + jitter)
    }
}

/// Category of an execution-history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Workflow execution began
    WorkflowStart,
    /// Workflow execution finished (any terminal status)
    WorkflowEnd,
    /// A step started running
    StepStart,
    /// A step attempt was launched
    StepAttempt,
    /// A step attempt succeeded
    StepSuccess,
    /// A step failed terminally
    StepFailure,
    /// A step attempt failed transiently and will be retried
    StepRetry,
    /// An agent dispatched a tool call
    ToolCall,
    /// A tool handler returned
    ToolResult,
}

/// A single entry in a workflow's execution history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event category
    pub category: EventCategory,
    /// Step id, where applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Attempt number (1-based), where applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Elapsed duration in milliseconds, where applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Category-specific payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ExecutionEvent {
    /// Create an event with the given category, stamped now
    pub fn new(category: EventCategory) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            step_id: None,
            attempt: None,
            duration_ms: None,
            payload: None,
        }
    }

    /// Attach a step id
    #[must_use]
    pub fn step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Attach an attempt number
    #[must_use]
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attach an elapsed duration
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Attach a payload
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Aggregate metrics for one workflow execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    /// Total number of steps in the workflow
    pub total_steps: usize,
    /// Steps that reached success
    pub completed_steps: usize,
    /// Steps that failed terminally
    pub failed_steps: usize,
    /// Steps whose final successful attempt was not the first
    pub retried_steps: usize,
    /// Wall-clock duration of the whole execution in seconds
    pub total_elapsed_seconds: f64,
    /// Per-step wall-clock durations in milliseconds
    pub step_durations_ms: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        // Capped at max_delay.
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let full = policy.delay_for(attempt);
            let jittered = policy.jittered_delay(attempt);
            assert!(jittered >= full / 2);
            assert!(jittered <= full);
        }
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = ExecutionEvent::new(EventCategory::StepSuccess)
            .step("fetch")
            .attempt(2)
            .duration(Duration::from_millis(1500));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["category"], "step_success");
        assert_eq!(value["step_id"], "fetch");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["duration_ms"], 1500);
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::tool_result("{\"ok\":true}");
        assert_eq!(msg.role, MessageRole::ToolResult);
        assert_eq!(
            serde_json::to_value(msg.role).unwrap(),
            serde_json::json!("tool_result")
        );
    }

    #[test]
    fn test_tool_output() {
        let ok = ToolOutput::success(serde_json::json!({"value": 42}));
        assert!(!ok.is_error);

        let err = ToolOutput::error("handler panicked");
        assert!(err.is_error);
        assert_eq!(err.content, serde_json::json!("handler panicked"));
    }
}
