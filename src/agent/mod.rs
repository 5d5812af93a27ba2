//! Agents: stateful execution units that format prompts, invoke the model
//! client, optionally run tool-call loops, and return typed results.
//!
//! A single [`Agent`] struct covers all behaviors; the execution algorithm
//! is selected by the presence of a tool registry and a reasoning pattern
//! rather than by a type hierarchy.

use crate::{
    error::{AgentFlowError, Result},
    model::{ModelClient, ModelContent, ModelRequest, ModelType},
    patterns::ReasoningPattern,
    tool::ToolRegistry,
    types::{
        AgentId, ChatMessage, EventCategory, ExecutionEvent, RetryPolicy, ToolOutput,
    },
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Event sink used to surface tool-call activity into the workflow history
pub(crate) type EventSink = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Per-invocation execution scope: cancellation plus optional event
/// reporting back to the enclosing scheduler.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Cooperative cancellation token, checked at every suspension point
    pub cancel: CancellationToken,
    step_id: Option<String>,
    sink: Option<EventSink>,
}

impl ExecutionContext {
    /// Context with a fresh cancellation token and no event sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing cancellation token
    #[must_use]
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Scheduler-facing constructor: attribute events to a step and route
    /// them into the workflow history.
    pub(crate) fn scoped(
        step_id: impl Into<String>,
        cancel: CancellationToken,
        sink: EventSink,
    ) -> Self {
        Self {
            cancel,
            step_id: Some(step_id.into()),
            sink: Some(sink),
        }
    }

    pub(crate) fn emit(&self, mut event: ExecutionEvent) {
        if event.step_id.is_none() {
            event.step_id = self.step_id.clone();
        }
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("step_id", &self.step_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent name
    pub name: String,
    /// Agent description
    pub description: String,
    /// Model selector
    pub model: ModelType,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// Optional reasoning pattern applied to the rendered prompt
    pub reasoning_pattern: Option<ReasoningPattern>,
    /// Sequences that stop generation
    pub stop_sequences: Vec<String>,
    /// Agent-level retry policy (stacks with the model client's own retry)
    pub retry: RetryPolicy,
    /// Per-invocation deadline; the scheduler falls back to its default
    /// step timeout when unset
    pub invoke_timeout: Option<Duration>,
    /// Upper bound on tool-loop iterations
    pub max_tool_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            description: String::new(),
            model: ModelType::Sonnet45,
            temperature: 0.7,
            max_tokens: 4096,
            system_prompt: None,
            reasoning_pattern: None,
            stop_sequences: Vec::new(),
            retry: RetryPolicy::default(),
            invoke_timeout: None,
            max_tool_iterations: 8,
        }
    }
}

impl AgentConfig {
    /// Configuration with the given name and defaults for everything else
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Running per-agent execution metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    /// Total execution attempts
    pub invocations: u64,
    /// Attempts that returned a result
    pub successes: u64,
    /// Attempts that failed
    pub failures: u64,
    /// Kind of the most recent failure
    pub last_error_kind: Option<&'static str>,
}

/// A named, reusable execution unit bound to the model client.
///
/// Re-entrant: an agent may be invoked from multiple concurrent step
/// executions; metrics mutate under an internal mutex and no per-invocation
/// state outlives the call.
#[derive(Debug)]
pub struct Agent {
    id: AgentId,
    config: AgentConfig,
    prompt_template: String,
    client: Arc<ModelClient>,
    tools: Option<Arc<ToolRegistry>>,
    metrics: Mutex<AgentMetrics>,
}

impl Agent {
    /// Create an agent with a prompt template
    pub fn new(
        config: AgentConfig,
        prompt_template: impl Into<String>,
        client: Arc<ModelClient>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            prompt_template: prompt_template.into(),
            client,
            tools: None,
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }

    /// Attach a tool registry, enabling the tool-call loop
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Agent id
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Agent name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Snapshot of the running metrics
    pub async fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().await.clone()
    }

    /// Execute the agent against a named input map.
    ///
    /// The rendered prompt, optional reasoning-pattern rewrite, model
    /// invocation, and optional tool loop run under the agent's retry
    /// policy; only transient kinds are retried.
    pub async fn execute(
        &self,
        inputs: &HashMap<String, serde_json::Value>,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        let span = tracing::info_span!(
            "agent",
            agent_id = %self.id,
            agent = %self.config.name,
        );
        self.execute_with_retry(inputs, ctx).instrument(span).await
    }

    async fn execute_with_retry(
        &self,
        inputs: &HashMap<String, serde_json::Value>,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        let mut attempt: u32 = 0;

        loop {
            {
                let mut metrics = self.metrics.lock().await;
                metrics.invocations += 1;
            }

            match self.execute_once(inputs, ctx).await {
                Ok(value) => {
                    let mut metrics = self.metrics.lock().await;
                    metrics.successes += 1;
                    return Ok(value);
                }
                Err(err) => {
                    {
                        let mut metrics = self.metrics.lock().await;
                        metrics.failures += 1;
                        metrics.last_error_kind = Some(err.kind());
                    }

                    if err.is_retryable() && attempt + 1 < self.config.retry.max_attempts {
                        let delay = self.config.retry.jittered_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "agent execution failed, retrying"
                        );
                        tokio::select! {
                            () = ctx.cancel.cancelled() => return Err(AgentFlowError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn execute_once(
        &self,
        inputs: &HashMap<String, serde_json::Value>,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        let mut prompt = render_template(&self.prompt_template, inputs)?;

        if let Some(pattern) = self.config.reasoning_pattern {
            debug!(pattern = pattern.name(), "applying reasoning pattern");
            prompt = pattern.apply(&prompt);
        }

        match &self.tools {
            Some(registry) => self.run_tool_loop(registry, prompt, ctx).await,
            None => {
                let request = self.build_request(vec![ChatMessage::user(prompt)]);
                let response = self.client.invoke(&request, &ctx.cancel).await?;

                match response.content {
                    ModelContent::Text { text } => Ok(serde_json::Value::String(text)),
                    ModelContent::ToolUse { name, .. } => {
                        Err(AgentFlowError::validation(format!(
                            "model requested tool '{name}' but the agent has no tools configured"
                        )))
                    }
                }
            }
        }
    }

    /// Bounded conversation loop: alternate model calls and tool dispatches
    /// until the model returns text or the iteration budget runs out.
    async fn run_tool_loop(
        &self,
        registry: &ToolRegistry,
        prompt: String,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value> {
        let mut messages = vec![ChatMessage::user(prompt)];
        let mut handler_failures: HashMap<String, u32> = HashMap::new();

        for _ in 0..self.config.max_tool_iterations {
            let request = self.build_request(messages.clone());
            let response = self.client.invoke(&request, &ctx.cancel).await?;

            match response.content {
                ModelContent::Text { text } => return Ok(serde_json::Value::String(text)),
                ModelContent::ToolUse { name, input } => {
                    ctx.emit(
                        ExecutionEvent::new(EventCategory::ToolCall)
                            .payload(serde_json::json!({ "tool": &name, "arguments": &input })),
                    );

                    let output = registry.dispatch(&name, input.clone()).await?;

                    ctx.emit(
                        ExecutionEvent::new(EventCategory::ToolResult)
                            .payload(serde_json::json!({ "tool": &name, "is_error": output.is_error })),
                    );

                    if output.is_error {
                        // The first handler failure goes back to the model
                        // as an error-marked observation; a consecutive
                        // repeat failure of the same tool escalates.
                        let failures = handler_failures.entry(name.clone()).or_insert(0);
                        *failures += 1;
                        if *failures > 1 {
                            return Err(AgentFlowError::tool_failure(
                                name.as_str(),
                                output
                                    .content
                                    .as_str()
                                    .unwrap_or("handler failed")
                                    .to_string(),
                            ));
                        }
                    } else {
                        // A success clears the streak: a later failure of
                        // this tool counts as a fresh first failure.
                        handler_failures.remove(&name);
                    }

                    messages.push(ChatMessage::assistant(
                        serde_json::json!({ "tool_use": { "name": name, "input": input } })
                            .to_string(),
                    ));
                    messages.push(ChatMessage::tool_result(render_tool_output(&output)));
                }
            }
        }

        let snapshot = serde_json::to_string(&messages).unwrap_or_default();
        Err(AgentFlowError::validation(format!(
            "tool loop did not terminate within {} iterations; conversation: {snapshot}",
            self.config.max_tool_iterations
        )))
    }

    fn build_request(&self, messages: Vec<ChatMessage>) -> ModelRequest {
        ModelRequest {
            model: self.config.model,
            messages,
            system_prompt: self.config.system_prompt.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: self
                .tools
                .as_ref()
                .map(|registry| registry.schemas())
                .unwrap_or_default(),
            stop_sequences: self.config.stop_sequences.clone(),
        }
    }
}

fn render_tool_output(output: &ToolOutput) -> String {
    if output.is_error {
        format!(
            "[tool_error] {}",
            output.content.as_str().unwrap_or("handler failed")
        )
    } else {
        output.content.to_string()
    }
}

/// Substitute `{name}` placeholders from the input map.
///
/// `{{` and `}}` escape literal braces. String values are inserted as-is;
/// other JSON values are inserted in their JSON rendering. A placeholder
/// naming a missing input is a validation error.
pub(crate) fn render_template(
    template: &str,
    inputs: &HashMap<String, serde_json::Value>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => {
                            return Err(AgentFlowError::validation(
                                "unclosed '{' placeholder in prompt template",
                            ))
                        }
                    }
                }
                let key = key.trim();
                let value = inputs.get(key).ok_or_else(|| {
                    AgentFlowError::validation(format!("missing required input '{key}'"))
                })?;
                out.push_str(&render_value(value));
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_template_basic() {
        let rendered = render_template(
            "Summarize {topic} in {count} bullet points",
            &inputs(&[("topic", json!("Rust")), ("count", json!(3))]),
        )
        .unwrap();
        assert_eq!(rendered, "Summarize Rust in 3 bullet points");
    }

    #[test]
    fn test_render_template_missing_input() {
        let err = render_template("Hello {name}", &HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(format!("{err}").contains("name"));
    }

    #[test]
    fn test_render_template_escapes() {
        let rendered = render_template(
            "Return {{\"key\": {value}}}",
            &inputs(&[("value", json!(7))]),
        )
        .unwrap();
        assert_eq!(rendered, "Return {\"key\": 7}");
    }

    #[test]
    fn test_render_template_unclosed() {
        let err = render_template("Hello {name", &inputs(&[("name", json!("x"))])).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_render_template_json_values() {
        let rendered = render_template(
            "Input: {payload}",
            &inputs(&[("payload", json!({"a": [1, 2]}))]),
        )
        .unwrap();
        assert_eq!(rendered, "Input: {\"a\":[1,2]}");
    }

    #[test]
    fn test_config_defaults() {
        let config = AgentConfig::named("planner");
        assert_eq!(config.name, "planner");
        assert_eq!(config.model, ModelType::Sonnet45);
        assert_eq!(config.max_tool_iterations, 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.invoke_timeout.is_none());
    }
}
