use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::features::query_agent::error::AgentError;
use crate::shared::panic::panic_message;

use super::conversation_driver::ConversationDriver;

/// Events buffered between the conversation task and the HTTP writer
const RELAY_BUFFER: usize = 64;

/// One frame of a streamed answer.
///
/// A sequence always opens with `Start` and closes with exactly one `Done`
/// or `Error`; nothing follows the terminator.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start { query: String },
    Token { text: String },
    Done,
    Error { message: String },
}

/// Where the conversation driver writes text deltas
#[derive(Clone)]
pub struct TokenSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl TokenSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    /// Forward one delta; fails with `Cancelled` once the consumer is gone
    pub async fn token(&self, text: String) -> Result<(), AgentError> {
        self.tx
            .send(StreamEvent::Token { text })
            .await
            .map_err(|_| AgentError::Cancelled)
    }

    /// Resolves when the consumer has disconnected
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Turns a streamed conversation into an ordered, terminator-safe event
/// sequence. Never touches the response cache.
pub struct StreamingRelay {
    driver: Arc<ConversationDriver>,
}

impl StreamingRelay {
    pub fn new(driver: Arc<ConversationDriver>) -> Self {
        Self { driver }
    }

    /// Start answering `query` in the background and return its event feed.
    ///
    /// Dropping the receiver cancels the conversation at its next suspension
    /// point; any tool result still in flight is discarded.
    pub fn start(&self, query: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let driver = Arc::clone(&self.driver);

        tokio::spawn(relay(driver, query, tx));

        rx
    }
}

async fn relay(driver: Arc<ConversationDriver>, query: String, tx: mpsc::Sender<StreamEvent>) {
    let start = StreamEvent::Start {
        query: query.clone(),
    };
    if tx.send(start).await.is_err() {
        tracing::debug!("Stream consumer left before start");
        return;
    }

    let sink = TokenSink::new(tx.clone());
    let outcome = AssertUnwindSafe(driver.answer_stream(&query, &sink))
        .catch_unwind()
        .await;
    drop(sink);

    let terminal = match outcome {
        Ok(Ok(_)) => StreamEvent::Done,
        Ok(Err(AgentError::Cancelled)) => {
            tracing::info!("Stream cancelled by client");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!("Streamed query failed: {}", e);
            StreamEvent::Error {
                message: e.to_string(),
            }
        }
        Err(payload) => {
            tracing::error!(
                "Streamed query panicked: {}",
                panic_message(payload.as_ref())
            );
            StreamEvent::Error {
                message: "Internal error while answering the query".to_string(),
            }
        }
    };

    // The consumer may have left in the meantime; nothing else to do then
    let _ = tx.send(terminal).await;
}
