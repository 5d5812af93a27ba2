//! Agent workflow orchestration over large-language-model backends.
//!
//! AgentFlow executes structured, multi-step reasoning pipelines: each step
//! binds an agent to fixed inputs and dependencies, independent steps run
//! concurrently in wave batches, and every layer (model client, agent,
//! scheduler) recovers transient faults with its own retry budget.
//!
//! # Features
//!
//! - **Workflow Scheduler**: dependency-graph validation, topological wave
//!   batching, parallel dispatch, per-step and whole-workflow deadlines
//! - **Agents**: prompt templating, reasoning-pattern rewriting, bounded
//!   tool-call loops, per-agent metrics
//! - **Model Client**: closed model routing table and fault-tolerant
//!   invocation with capped, jittered exponential backoff
//! - **Tool System**: name-keyed registry of caller-provided handlers
//! - **Structured Logging**: key/value records via `tracing`, with an
//!   optional JSON sink for log aggregation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agentflow::prelude::*;
//! use std::{collections::HashMap, sync::Arc};
//!
//! #[tokio::main]
//! async fn main() -> agentflow::Result<()> {
//!     let provider = HttpModelProvider::new(HttpProviderConfig::for_region("us-east-1"))?;
//!     let client = Arc::new(ModelClient::new(Arc::new(provider)));
//!
//!     let summarize = Arc::new(Agent::new(
//!         AgentConfig::named("summarizer"),
//!         "Summarize the following topic: {topic}",
//!         client,
//!     ));
//!
//!     let mut workflow = Workflow::new(WorkflowConfig::named("research"));
//!     let mut inputs = HashMap::new();
//!     inputs.insert("topic".to_string(), serde_json::json!("ownership in Rust"));
//!     workflow.add_step("summarize", summarize, inputs, vec![])?;
//!
//!     let run = workflow.execute().await?;
//!     println!("status: {:?}, results: {:?}", run.status, run.results);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core modules
pub mod agent;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod patterns;
pub mod tool;
pub mod types;
pub mod workflow;

// Re-exports for convenience
pub use agent::{Agent, AgentConfig, AgentMetrics, ExecutionContext};
pub use config::Settings;
pub use error::{AgentFlowError, Result};
pub use model::{ModelClient, ModelType, TaskComplexity};
pub use patterns::ReasoningPattern;
pub use tool::{FnTool, Tool, ToolRegistry};
pub use workflow::{Workflow, WorkflowConfig, WorkflowRun, WorkflowStatus};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        agent::{Agent, AgentConfig, AgentMetrics, ExecutionContext},
        config::Settings,
        error::{AgentFlowError, Result},
        logging::init_logging,
        model::{
            HttpModelProvider, HttpProviderConfig, ModelClient, ModelContent, ModelProvider,
            ModelRequest, ModelResponse, ModelType, TaskComplexity, TokenUsage,
        },
        patterns::ReasoningPattern,
        tool::{FnTool, Tool, ToolRegistry},
        types::{
            ChatMessage, EventCategory, ExecutionEvent, MessageRole, RetryPolicy, ToolOutput,
            ToolSchema, WorkflowMetrics,
        },
        workflow::{
            Step, StepStatus, Workflow, WorkflowConfig, WorkflowErrorInfo, WorkflowRun,
            WorkflowStatus,
        },
    };
}
