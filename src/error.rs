//! Error types for the AgentFlow framework.

use thiserror::Error;

/// Result type alias for AgentFlow operations
pub type Result<T> = std::result::Result<T, AgentFlowError>;

/// Closed set of failure kinds for workflow and agent execution.
///
/// Every failure surfaced by the framework carries exactly one of these
/// kinds. [`AgentFlowError::is_retryable`] is the single source of truth
/// for retry decisions at every layer (model client, agent, scheduler).
#[derive(Error, Debug)]
pub enum AgentFlowError {
    /// Malformed input or configuration
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// Missing required configuration (credentials, model id, settings)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Workflow validation detected a dependency cycle
    #[error("Cyclic dependency: {message}")]
    CyclicGraph {
        /// Error message
        message: String,
    },

    /// Step references a dependency that does not exist
    #[error("Step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// Step declaring the dependency
        step_id: String,
        /// The missing dependency id
        dependency: String,
    },

    /// Rate limit from the model provider
    #[error("Model invocation throttled: {message}")]
    Throttled {
        /// Error message
        message: String,
    },

    /// Network failure, timeout, or 5xx-class provider error
    #[error("Transient model invocation failure: {message}")]
    ModelTransient {
        /// Error message
        message: String,
    },

    /// Authentication, permission, or unknown-model failure
    #[error("Fatal model invocation failure: {message}")]
    ModelFatal {
        /// Error message
        message: String,
    },

    /// Agent requested a tool name that is not registered
    #[error("Tool '{tool_name}' not found in registry")]
    ToolNotFound {
        /// The missing tool name
        tool_name: String,
    },

    /// Tool handler failed repeatedly
    #[error("Tool '{tool_name}' failed: {message}")]
    ToolFailure {
        /// Tool name
        tool_name: String,
        /// Error message
        message: String,
    },

    /// Step exceeded its per-step deadline
    #[error("Step '{step_id}' timed out after {timeout_ms}ms")]
    StepTimeout {
        /// Step id
        step_id: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Whole-workflow deadline expired
    #[error("Workflow timed out after {timeout_ms}ms")]
    WorkflowTimeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Caller requested cancellation
    #[error("Execution cancelled")]
    Cancelled,
}

impl AgentFlowError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cyclic-graph error
    pub fn cyclic_graph(message: impl Into<String>) -> Self {
        Self::CyclicGraph {
            message: message.into(),
        }
    }

    /// Create an unknown-dependency error
    pub fn unknown_dependency(step_id: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            step_id: step_id.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a throttle error
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Create a transient model invocation error
    pub fn model_transient(message: impl Into<String>) -> Self {
        Self::ModelTransient {
            message: message.into(),
        }
    }

    /// Create a fatal model invocation error
    pub fn model_fatal(message: impl Into<String>) -> Self {
        Self::ModelFatal {
            message: message.into(),
        }
    }

    /// Create a tool-not-found error
    pub fn tool_not_found(tool_name: impl Into<String>) -> Self {
        Self::ToolNotFound {
            tool_name: tool_name.into(),
        }
    }

    /// Create a tool-failure error
    pub fn tool_failure(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailure {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a step-timeout error
    pub fn step_timeout(step_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::StepTimeout {
            step_id: step_id.into(),
            timeout_ms,
        }
    }

    /// Create a workflow-timeout error
    pub fn workflow_timeout(timeout_ms: u64) -> Self {
        Self::WorkflowTimeout { timeout_ms }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::ModelTransient { .. })
    }

    /// Get the error kind for logging, history entries, and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::CyclicGraph { .. } => "cyclic_graph",
            Self::UnknownDependency { .. } => "unknown_dependency",
            Self::Throttled { .. } => "model_invocation_throttle",
            Self::ModelTransient { .. } => "model_invocation_transient",
            Self::ModelFatal { .. } => "model_invocation_fatal",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::ToolFailure { .. } => "tool_failure",
            Self::StepTimeout { .. } => "step_timeout",
            Self::WorkflowTimeout { .. } => "workflow_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

// Serde failures are always caused by malformed caller input.
impl From<serde_json::Error> for AgentFlowError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AgentFlowError::configuration("missing model id");
        assert!(matches!(err, AgentFlowError::Configuration { .. }));
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AgentFlowError::throttled("429").is_retryable());
        assert!(AgentFlowError::model_transient("connection reset").is_retryable());

        assert!(!AgentFlowError::model_fatal("bad credentials").is_retryable());
        assert!(!AgentFlowError::validation("bad input").is_retryable());
        assert!(!AgentFlowError::step_timeout("step1", 1000).is_retryable());
        assert!(!AgentFlowError::Cancelled.is_retryable());
    }

    #[test]
    fn test_kind_is_total() {
        let errors = vec![
            AgentFlowError::validation("x"),
            AgentFlowError::configuration("x"),
            AgentFlowError::cyclic_graph("x"),
            AgentFlowError::unknown_dependency("a", "b"),
            AgentFlowError::throttled("x"),
            AgentFlowError::model_transient("x"),
            AgentFlowError::model_fatal("x"),
            AgentFlowError::tool_not_found("t"),
            AgentFlowError::tool_failure("t", "x"),
            AgentFlowError::step_timeout("s", 1),
            AgentFlowError::workflow_timeout(1),
            AgentFlowError::Cancelled,
        ];
        let kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), 12);
        for kind in kinds {
            assert!(!kind.is_empty());
        }
    }

    #[test]
    fn test_error_display() {
        let err = AgentFlowError::unknown_dependency("summarize", "fetch");
        let display = format!("{err}");
        assert!(display.contains("summarize"));
        assert!(display.contains("fetch"));
    }
}
