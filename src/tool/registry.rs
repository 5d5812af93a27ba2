//! Tool registry: a name-keyed table of tool handlers.

use crate::{
    error::{AgentFlowError, Result},
    tool::Tool,
    types::{ToolOutput, ToolSchema},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// Name-keyed table of tools.
///
/// Populated before any tool-capable agent executes and shared read-only
/// (behind an `Arc`) during execution.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.tools.contains_key(&name) {
            return Err(AgentFlowError::configuration(format!(
                "tool '{name}' is already registered"
            )));
        }

        debug!(tool = %name, "registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    /// Check whether a tool is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of all registered tools
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    /// Invoke a tool by name.
    ///
    /// A missing name is an error; a handler failure is captured as an
    /// error-marked [`ToolOutput`] so the enclosing agent can feed it back
    /// to the model.
    pub async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentFlowError::tool_not_found(name))?;

        debug!(tool = name, "dispatching tool call");

        match tool.call(arguments).await {
            Ok(value) => Ok(ToolOutput::success(value)),
            Err(err) => {
                warn!(tool = name, error = %err, "tool handler failed");
                Ok(ToolOutput::error(err.to_string()))
            }
        }
    }
}
