//! Remote language-model service integration

mod anthropic;
mod client;
mod types;

pub use anthropic::AnthropicClient;
pub use client::{ModelClient, ModelError};
pub use types::{
    ContentBlock, Message, ModelRequest, ModelResponse, ModelStreamEvent, ToolSchema, ToolUse,
};

#[cfg(test)]
pub use client::ModelEventStream;
