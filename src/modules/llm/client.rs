use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::types::{ModelRequest, ModelResponse, ModelStreamEvent};

/// Stream of incremental events for one model turn
pub type ModelEventStream = BoxStream<'static, Result<ModelStreamEvent, ModelError>>;

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode model response: {0}")]
    Decode(String),

    #[error("model stream failed: {0}")]
    Stream(String),
}

impl ModelError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Timeout(_) | ModelError::Transport(_) => true,
            ModelError::Api { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
            }
            ModelError::Decode(_) | ModelError::Stream(_) => false,
        }
    }
}

/// Remote language-model service.
///
/// Implementations must support concurrent independent calls; each call is a
/// self-contained request so one conversation never blocks another.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one turn and wait for the complete response
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Run one turn, yielding text deltas as they arrive and ending with
    /// `ModelStreamEvent::Completed`
    async fn stream(&self, request: &ModelRequest) -> Result<ModelEventStream, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ModelError::Transport("reset".to_string()).is_transient());
        assert!(ModelError::Api {
            status: 529,
            message: "overloaded".to_string()
        }
        .is_transient());
        assert!(ModelError::Api {
            status: 429,
            message: "rate limited".to_string()
        }
        .is_transient());
        assert!(!ModelError::Api {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!ModelError::Decode("eof".to_string()).is_transient());
    }
}
