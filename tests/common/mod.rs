//! Shared test fixtures: a scripted model provider and agent helpers.

#![allow(dead_code)]

use agentflow::{
    error::{AgentFlowError, Result},
    model::{ModelClient, ModelContent, ModelProvider, ModelRequest, ModelResponse, TokenUsage},
    prelude::*,
};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// One scripted model outcome
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return a text payload
    Text(String),
    /// Return a tool-call instruction
    ToolUse(String, serde_json::Value),
    /// Fail with a throttle error
    Throttle,
    /// Fail with a transient error
    Transient,
    /// Fail with a fatal error
    Fatal,
    /// Sleep, then return a text payload
    Slow(Duration, String),
}

/// Scripted responder standing in for the model backend.
///
/// Replies are keyed by a substring matched against the concatenated
/// conversation text. A queue with more than one entry pops per call; the
/// last entry repeats.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<Vec<(String, VecDeque<ScriptedReply>)>>,
    latency: Duration,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            // A small latency keeps wave members overlapping in time so
            // start/success ordering is observable in the history.
            latency: Duration::from_millis(5),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_script(self, matcher: &str, replies: Vec<ScriptedReply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((matcher.to_string(), replies.into()));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let haystack: String = request
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            let entry = scripts
                .iter_mut()
                .find(|(matcher, _)| haystack.contains(matcher.as_str()));
            match entry {
                Some((_, queue)) => {
                    if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    }
                }
                None => None,
            }
        };

        let reply = reply.ok_or_else(|| {
            AgentFlowError::model_fatal(format!("no scripted reply for conversation: {haystack}"))
        })?;

        let usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        };

        match reply {
            ScriptedReply::Text(text) => Ok(ModelResponse {
                content: ModelContent::Text { text },
                usage,
                stop_reason: Some("end_turn".to_string()),
            }),
            ScriptedReply::ToolUse(name, input) => Ok(ModelResponse {
                content: ModelContent::ToolUse { name, input },
                usage,
                stop_reason: Some("tool_use".to_string()),
            }),
            ScriptedReply::Throttle => Err(AgentFlowError::throttled("scripted throttle")),
            ScriptedReply::Transient => {
                Err(AgentFlowError::model_transient("scripted transient fault"))
            }
            ScriptedReply::Fatal => Err(AgentFlowError::model_fatal("scripted fatal fault")),
            ScriptedReply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(ModelResponse {
                    content: ModelContent::Text { text },
                    usage,
                    stop_reason: Some("end_turn".to_string()),
                })
            }
        }
    }
}

/// Model client with retries disabled, so tests exercise exactly the layer
/// they configure.
pub fn bare_client(provider: Arc<ScriptedProvider>) -> Arc<ModelClient> {
    Arc::new(ModelClient::new(provider).with_retry_policy(RetryPolicy::none()))
}

/// Agent with its own retry disabled
pub fn bare_agent(
    name: &str,
    template: &str,
    client: Arc<ModelClient>,
) -> Arc<Agent> {
    let config = AgentConfig {
        retry: RetryPolicy::none(),
        ..AgentConfig::named(name)
    };
    Arc::new(Agent::new(config, template, client))
}

/// Fast retry policy so retry-path tests stay quick under paused time
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}
