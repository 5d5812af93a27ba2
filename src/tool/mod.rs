//! Tool system for tool-capable agents.

use crate::{
    error::{AgentFlowError, Result},
    types::ToolSchema,
};
use async_trait::async_trait;
use std::sync::Arc;

pub mod registry;

pub use registry::ToolRegistry;

/// Core tool trait.
///
/// A tool takes a JSON-shaped argument object and returns a JSON-shaped
/// value. Handler errors are captured by the registry and surfaced to the
/// calling agent as error-marked tool results, never as panics.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Schema advertised to the model
    fn schema(&self) -> ToolSchema;

    /// Invoke the tool with the given arguments
    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value>;

    /// Tool name
    fn name(&self) -> String {
        self.schema().name
    }
}

/// Handler function signature accepted by [`FnTool`]
pub type ToolHandler =
    dyn Fn(serde_json::Value) -> std::result::Result<serde_json::Value, String> + Send + Sync;

/// Adapter turning a plain function into a [`Tool`].
///
/// This is the integration point for caller-provided handlers: any closure
/// from an argument object to a JSON-shaped value (or an error string).
pub struct FnTool {
    schema: ToolSchema,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    /// Wrap a handler function as a tool
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> std::result::Result<serde_json::Value, String>
            + Send
            + Sync
            + 'static,
    {
        Self {
            schema: ToolSchema::new(name, description),
            handler: Arc::new(handler),
        }
    }

    /// Set the input schema advertised to the model
    #[must_use]
    pub fn with_input_schema(mut self, input_schema: serde_json::Value) -> Self {
        self.schema = self.schema.with_input_schema(input_schema);
        self
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.schema.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
        (self.handler)(arguments)
            .map_err(|message| AgentFlowError::tool_failure(self.schema.name.as_str(), message))
    }
}
