mod conversation_driver;
mod prompt;
mod query_service;
mod response_cache;
mod streaming_policy;
mod streaming_relay;

pub use conversation_driver::{ConversationDriver, DriverConfig};
pub use prompt::SystemPrompt;
pub use query_service::{QueryAnswer, QueryService};
pub use response_cache::{CacheStats, ResponseCache};
pub use streaming_policy::{KeywordStreamingPolicy, StreamingPolicy};
pub use streaming_relay::StreamEvent;
