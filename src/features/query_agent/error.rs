use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::core::error::AppError;
use crate::modules::llm::ModelError;

/// Failure of one tool invocation. Always converted to a tool result the
/// model can read; never ends the conversation on its own.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Archive unavailable: {0}")]
    Unavailable(String),

    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Unavailable(_) | ToolError::Timeout(_))
    }

    /// Structured `{"error": ...}` payload fed back to the model
    pub fn to_result_value(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

impl From<AppError> for ToolError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation(msg) | AppError::BadRequest(msg) => ToolError::Validation(msg),
            ref e if e.is_transient() => ToolError::Unavailable(e.to_string()),
            other => ToolError::Execution(other.to_string()),
        }
    }
}

/// Terminal failure of a conversation
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Model service error: {0}")]
    ModelService(#[from] ModelError),

    #[error("No final answer after {0} model turns")]
    LoopBoundExceeded(u32),

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AgentError> for AppError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::ModelService(_) | AgentError::LoopBoundExceeded(_) => {
                AppError::ExternalServiceError(error.to_string())
            }
            AgentError::Cancelled | AgentError::Internal(_) => {
                AppError::Internal(error.to_string())
            }
        }
    }
}
