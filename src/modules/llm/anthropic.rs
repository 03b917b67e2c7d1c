use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::config::ModelConfig;

use super::client::{ModelClient, ModelError, ModelEventStream};
use super::types::{
    ContentBlock, Message, ModelRequest, ModelResponse, ModelStreamEvent, ToolSchema,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_BUFFER: usize = 64;

/// Client for the Anthropic Messages API
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSchema],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetails,
}

#[derive(Deserialize)]
struct ApiErrorDetails {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl ApiErrorDetails {
    /// Status the API reports for this error type on a non-streaming call
    fn retryable_status(&self) -> Option<u16> {
        match self.error_type.as_str() {
            "rate_limit_error" => Some(429),
            "api_error" => Some(500),
            "overloaded_error" => Some(529),
            _ => None,
        }
    }

    /// Error events arrive after a 200, so the type decides retryability
    fn into_stream_error(self) -> ModelError {
        match self.retryable_status() {
            Some(status) => ModelError::Api {
                status,
                message: String::from(self),
            },
            None => ModelError::Stream(String::from(self)),
        }
    }
}

impl From<ApiErrorDetails> for String {
    fn from(value: ApiErrorDetails) -> Self {
        format!("{}: {}", value.error_type, value.message)
    }
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    async fn send(
        &self,
        request: &ModelRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ModelError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
            stream,
        };

        let mut builder = self
            .http
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        // Streams are bounded by an idle timeout in the consumer instead
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(self.timeout)
            } else {
                ModelError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&raw)
            .map(|body| String::from(body.error))
            .unwrap_or(raw);

        Err(ModelError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let response = self.send(request, false).await?;
        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(self.timeout)
            } else {
                ModelError::Decode(e.to_string())
            }
        })?;

        Ok(ModelResponse {
            content: parsed.content,
            stop_reason: parsed.stop_reason,
        })
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ModelEventStream, ModelError> {
        let response = self.send(request, true).await?;
        let mut events = response.bytes_stream().eventsource();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut assembler = StreamAssembler::default();

            while let Some(item) = events.next().await {
                let sse = match item {
                    Ok(sse) => sse,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::Stream(e.to_string()))).await;
                        return;
                    }
                };

                tracing::trace!("Anthropic SSE [{}] {}", sse.event, sse.data);

                match assembler.apply(&sse.event, &sse.data) {
                    Ok(Some(event)) => {
                        let completed = matches!(event, ModelStreamEvent::Completed(_));
                        if tx.send(Ok(event)).await.is_err() {
                            // Consumer went away; dropping the body aborts the request
                            tracing::debug!("Model stream consumer dropped");
                            return;
                        }
                        if completed {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(Err(ModelError::Stream(
                    "stream closed before message_stop".to_string(),
                )))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

// Streaming wire events

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    index: usize,
    content_block: StartBlock,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StartBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    index: usize,
    delta: Delta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaBody,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
    Other,
}

/// Folds Messages API stream events into deltas plus the final response
#[derive(Debug, Default)]
struct StreamAssembler {
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<String>,
}

fn parse<T: for<'de> Deserialize<'de>>(event: &str, data: &str) -> Result<T, ModelError> {
    serde_json::from_str(data).map_err(|e| ModelError::Decode(format!("{}: {}", event, e)))
}

impl StreamAssembler {
    fn apply(&mut self, event: &str, data: &str) -> Result<Option<ModelStreamEvent>, ModelError> {
        match event {
            "content_block_start" => {
                let start: ContentBlockStart = parse(event, data)?;
                let (block, emitted) = match start.content_block {
                    StartBlock::Text { text } => {
                        let emitted =
                            (!text.is_empty()).then(|| ModelStreamEvent::TextDelta(text.clone()));
                        (PartialBlock::Text(text), emitted)
                    }
                    StartBlock::ToolUse { id, name } => {
                        let emitted = ModelStreamEvent::ToolUseBegin {
                            id: id.clone(),
                            name: name.clone(),
                        };
                        (
                            PartialBlock::ToolUse {
                                id,
                                name,
                                input_json: String::new(),
                            },
                            Some(emitted),
                        )
                    }
                    StartBlock::Other => (PartialBlock::Other, None),
                };
                self.blocks.insert(start.index, block);
                Ok(emitted)
            }
            "content_block_delta" => {
                let delta: ContentBlockDelta = parse(event, data)?;
                match (self.blocks.get_mut(&delta.index), delta.delta) {
                    (Some(PartialBlock::Text(buffer)), Delta::TextDelta { text }) => {
                        buffer.push_str(&text);
                        Ok(Some(ModelStreamEvent::TextDelta(text)))
                    }
                    (
                        Some(PartialBlock::ToolUse { input_json, .. }),
                        Delta::InputJsonDelta { partial_json },
                    ) => {
                        input_json.push_str(&partial_json);
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            "message_delta" => {
                let delta: MessageDelta = parse(event, data)?;
                if delta.delta.stop_reason.is_some() {
                    self.stop_reason = delta.delta.stop_reason;
                }
                Ok(None)
            }
            "message_stop" => Ok(Some(ModelStreamEvent::Completed(self.finish()?))),
            "error" => {
                let body: ApiErrorBody = parse(event, data)?;
                Err(body.error.into_stream_error())
            }
            // message_start, content_block_stop, ping
            _ => Ok(None),
        }
    }

    fn finish(&mut self) -> Result<ModelResponse, ModelError> {
        let mut content = Vec::with_capacity(self.blocks.len());

        for block in std::mem::take(&mut self.blocks).into_values() {
            match block {
                PartialBlock::Text(text) => content.push(ContentBlock::Text { text }),
                PartialBlock::ToolUse {
                    id,
                    name,
                    input_json,
                } => {
                    let input = if input_json.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&input_json).map_err(|e| {
                            ModelError::Decode(format!("tool input for {}: {}", name, e))
                        })?
                    };
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
                PartialBlock::Other => {}
            }
        }

        Ok(ModelResponse {
            content,
            stop_reason: self.stop_reason.take(),
        })
    }
}
