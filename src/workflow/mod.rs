//! Workflow definition and orchestration.
//!
//! A workflow holds a table of steps keyed by id, each bound to an agent
//! with literal inputs and a dependency set. Execution validates the step
//! graph, batches independent steps into waves, and dispatches them under
//! per-step and whole-workflow deadlines with layered retry. See
//! [`scheduler`] for the execution engine.

use crate::{
    agent::Agent,
    config::Settings,
    error::{AgentFlowError, Result},
    types::{ExecutionEvent, WorkflowId, WorkflowMetrics},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub mod scheduler;

/// Workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Not yet executed
    Pending,
    /// Execution in progress
    Running,
    /// All steps succeeded
    Completed,
    /// A step failed terminally or a deadline expired
    Failed,
    /// Caller requested cancellation
    Cancelled,
}

/// Per-step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Waiting on dependencies
    Pending,
    /// Currently executing
    Running,
    /// Completed with a result
    Success,
    /// Failed terminally
    Failed,
    /// Never ran because the workflow terminated first
    Skipped,
}

/// Execution policy for a workflow
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,
    /// Workflow description
    pub description: String,
    /// Whole-workflow deadline
    pub timeout: Duration,
    /// Step-level retries on transient failures (in addition to the first
    /// attempt; independent of the agent's own retry budget)
    pub max_step_retries: u32,
    /// Whole-workflow retries when a run fails with a transient kind
    pub max_workflow_retries: u32,
    /// Run independent steps of a wave concurrently
    pub enable_parallel: bool,
    /// Concurrency cap for parallel wave dispatch
    pub max_parallel_steps: usize,
    /// Per-step deadline when the agent does not configure one
    pub default_step_timeout: Duration,
    /// Emit debug-level progress records
    pub verbose_logging: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "workflow".to_string(),
            description: String::new(),
            timeout: Duration::from_secs(300),
            max_step_retries: 3,
            max_workflow_retries: 1,
            enable_parallel: true,
            max_parallel_steps: 5,
            default_step_timeout: Duration::from_secs(300),
            verbose_logging: false,
        }
    }
}

impl WorkflowConfig {
    /// Configuration with the given name and defaults for everything else
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Configuration with deadlines taken from runtime settings
    pub fn from_settings(name: impl Into<String>, settings: &Settings) -> Self {
        Self {
            name: name.into(),
            timeout: settings.default_workflow_timeout,
            default_step_timeout: settings.default_step_timeout,
            ..Self::default()
        }
    }
}

/// One step of a workflow: an agent bound to fixed inputs and dependencies
#[derive(Debug, Clone)]
pub struct Step {
    /// Step id, unique within the workflow
    pub step_id: String,
    /// The agent executed by this step
    pub agent: Arc<Agent>,
    /// Literal input map; dependency results are merged in at dispatch time
    pub inputs: HashMap<String, serde_json::Value>,
    /// Ids of steps that must succeed before this one becomes eligible
    pub dependencies: Vec<String>,
    /// Current status
    pub status: StepStatus,
    /// Attempts made by the scheduler (1-based after the first launch)
    pub attempts: u32,
    /// Committed result, on success
    pub result: Option<serde_json::Value>,
    /// Terminal error message, on failure
    pub error: Option<String>,
}

/// Terminating error recorded in a result bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowErrorInfo {
    /// Step that triggered termination, when attributable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Error kind from the taxonomy
    pub kind: String,
    /// Error message
    pub message: String,
}

/// Result bundle returned by [`Workflow::execute`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Workflow id
    pub workflow_id: WorkflowId,
    /// Terminal status
    pub status: WorkflowStatus,
    /// Committed step results (partial on failure)
    pub results: HashMap<String, serde_json::Value>,
    /// Append-only execution history
    pub history: Vec<ExecutionEvent>,
    /// Aggregate metrics
    pub metrics: WorkflowMetrics,
    /// Terminating error, when the workflow did not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowErrorInfo>,
}

/// Multi-step agent workflow with dependency resolution, wave-parallel
/// execution, layered retry, and deadline enforcement.
#[derive(Debug)]
pub struct Workflow {
    workflow_id: WorkflowId,
    config: WorkflowConfig,
    steps: Vec<Step>,
    status: WorkflowStatus,
    cancel: CancellationToken,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            config,
            steps: Vec::new(),
            status: WorkflowStatus::Pending,
            cancel: CancellationToken::new(),
        }
    }

    /// Workflow id
    pub fn id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Workflow name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Execution policy
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Steps in insertion order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Request cooperative cancellation of a running execution
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Add a step. Ids must be unique; the dependency graph is recorded but
    /// not validated until [`Workflow::execute`].
    pub fn add_step(
        &mut self,
        step_id: impl Into<String>,
        agent: Arc<Agent>,
        inputs: HashMap<String, serde_json::Value>,
        dependencies: Vec<String>,
    ) -> Result<()> {
        let step_id = step_id.into();

        if self.status != WorkflowStatus::Pending {
            return Err(AgentFlowError::validation(
                "cannot add steps after execution has started",
            ));
        }
        if self.steps.iter().any(|step| step.step_id == step_id) {
            return Err(AgentFlowError::validation(format!(
                "step '{step_id}' already exists"
            )));
        }

        debug!(step = %step_id, agent = agent.name(), "added step");
        self.steps.push(Step {
            step_id,
            agent,
            inputs,
            dependencies,
            status: StepStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
        });
        Ok(())
    }

    /// Validate the step graph: every declared dependency must name an
    /// existing step and the graph must be acyclic. Idempotent.
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<&str> = self.steps.iter().map(|s| s.step_id.as_str()).collect();

        for step in &self.steps {
            for dep in &step.dependencies {
                if !ids.contains(dep.as_str()) {
                    return Err(AgentFlowError::unknown_dependency(
                        step.step_id.as_str(),
                        dep.as_str(),
                    ));
                }
            }
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut in_stack: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !visited.contains(step.step_id.as_str())
                && self.has_cycle(&step.step_id, &mut visited, &mut in_stack)
            {
                return Err(AgentFlowError::cyclic_graph(format!(
                    "dependency cycle involving step '{}'",
                    step.step_id
                )));
            }
        }

        Ok(())
    }

    fn has_cycle<'a>(
        &'a self,
        step_id: &'a str,
        visited: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
    ) -> bool {
        visited.insert(step_id);
        in_stack.insert(step_id);

        if let Some(step) = self.steps.iter().find(|s| s.step_id == step_id) {
            for dep in &step.dependencies {
                if !visited.contains(dep.as_str()) {
                    if self.has_cycle(dep, visited, in_stack) {
                        return true;
                    }
                } else if in_stack.contains(dep.as_str()) {
                    return true;
                }
            }
        }

        in_stack.remove(step_id);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::AgentConfig,
        model::{ModelClient, ModelContent, ModelProvider, ModelRequest, ModelResponse, TokenUsage},
    };
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubProvider;

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse> {
            Ok(ModelResponse {
                content: ModelContent::Text {
                    text: "ok".to_string(),
                },
                usage: TokenUsage::default(),
                stop_reason: None,
            })
        }
    }

    fn test_agent() -> Arc<Agent> {
        let client = Arc::new(ModelClient::new(Arc::new(StubProvider)));
        Arc::new(Agent::new(AgentConfig::named("stub"), "{task}", client))
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let mut workflow = Workflow::new(WorkflowConfig::named("test"));
        workflow
            .add_step("a", test_agent(), HashMap::new(), vec![])
            .unwrap();

        let err = workflow
            .add_step("a", test_agent(), HashMap::new(), vec![])
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut workflow = Workflow::new(WorkflowConfig::named("test"));
        workflow
            .add_step("a", test_agent(), HashMap::new(), vec!["ghost".to_string()])
            .unwrap();

        let err = workflow.validate().unwrap_err();
        assert_eq!(err.kind(), "unknown_dependency");
    }

    #[test]
    fn test_cycle_rejected() {
        let mut workflow = Workflow::new(WorkflowConfig::named("test"));
        workflow
            .add_step("a", test_agent(), HashMap::new(), vec!["b".to_string()])
            .unwrap();
        workflow
            .add_step("b", test_agent(), HashMap::new(), vec!["a".to_string()])
            .unwrap();

        let err = workflow.validate().unwrap_err();
        assert_eq!(err.kind(), "cyclic_graph");
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut workflow = Workflow::new(WorkflowConfig::named("test"));
        workflow
            .add_step("a", test_agent(), HashMap::new(), vec!["a".to_string()])
            .unwrap();

        let err = workflow.validate().unwrap_err();
        assert_eq!(err.kind(), "cyclic_graph");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut workflow = Workflow::new(WorkflowConfig::named("test"));
        workflow
            .add_step("a", test_agent(), HashMap::new(), vec![])
            .unwrap();
        workflow
            .add_step("b", test_agent(), HashMap::new(), vec!["a".to_string()])
            .unwrap();

        assert!(workflow.validate().is_ok());
        assert!(workflow.validate().is_ok());

        let mut cyclic = Workflow::new(WorkflowConfig::named("cyclic"));
        cyclic
            .add_step("a", test_agent(), HashMap::new(), vec!["a".to_string()])
            .unwrap();
        assert_eq!(cyclic.validate().unwrap_err().kind(), "cyclic_graph");
        assert_eq!(cyclic.validate().unwrap_err().kind(), "cyclic_graph");
    }

    #[test]
    fn test_config_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.max_step_retries, 3);
        assert_eq!(config.max_workflow_retries, 1);
        assert!(config.enable_parallel);
        assert_eq!(config.max_parallel_steps, 5);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::Completed).unwrap(),
            serde_json::json!("completed")
        );
        assert_eq!(
            serde_json::to_value(StepStatus::Skipped).unwrap(),
            serde_json::json!("skipped")
        );
    }
}
