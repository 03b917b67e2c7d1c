//! Free-text queries over the weather archive.
//!
//! A question is answered by letting the model call archive tools in a
//! bounded loop. Synchronous answers go through a TTL response cache;
//! streamed answers are always computed fresh.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | POST | `/api/query` | Answer and wait (`{query, use_cache?}`) |
//! | POST | `/api/query/stream` | Answer as `start`/`token`/`done`/`error` SSE frames |
//! | POST | `/api/ask` | Pick one of the above with the streaming policy |
//! | GET | `/api/cache/stats` | Cache size, hits, misses, hit rate, TTL |
//! | POST | `/api/cache/clear` | Drop cached answers and reset counters |

pub mod dtos;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod tools;

pub use handlers::QueryState;
pub use services::{
    ConversationDriver, DriverConfig, KeywordStreamingPolicy, QueryService, ResponseCache,
    SystemPrompt,
};
pub use tools::create_tool_registry;
