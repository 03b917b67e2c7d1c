use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::error::{AppError, Result};
use crate::shared::panic::panic_message;

use super::conversation_driver::ConversationDriver;
use super::response_cache::ResponseCache;
use super::streaming_relay::{StreamEvent, StreamingRelay};

/// Answer to a synchronous query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub response: String,
    pub cached: bool,
}

/// Request-level entry point for free-text queries.
///
/// Each synchronous conversation runs in its own task so a panic anywhere in
/// it is turned into an error for that request alone.
pub struct QueryService {
    driver: Arc<ConversationDriver>,
    cache: Arc<ResponseCache>,
    relay: StreamingRelay,
}

impl QueryService {
    pub fn new(driver: Arc<ConversationDriver>, cache: Arc<ResponseCache>) -> Self {
        let relay = StreamingRelay::new(Arc::clone(&driver));
        Self {
            driver,
            cache,
            relay,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Answer through the cache; `use_cache = false` skips both lookup and store
    pub async fn answer(&self, query: &str, use_cache: bool) -> Result<QueryAnswer> {
        if use_cache {
            if let Some(response) = self.cache.get(query) {
                return Ok(QueryAnswer {
                    response,
                    cached: true,
                });
            }
        }

        let driver = Arc::clone(&self.driver);
        let owned_query = query.to_string();
        let response = tokio::spawn(async move { driver.answer(&owned_query).await })
            .await
            .map_err(|e| {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic().as_ref())
                } else {
                    e.to_string()
                };
                tracing::error!("Query task aborted: {}", reason);
                AppError::Internal(format!("query task aborted: {}", reason))
            })??;

        if use_cache {
            self.cache.put(query, response.clone());
        }

        Ok(QueryAnswer {
            response,
            cached: false,
        })
    }

    /// Stream a freshly computed answer; the cache is never consulted
    pub fn stream(&self, query: &str) -> mpsc::Receiver<StreamEvent> {
        self.relay.start(query.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::features::query_agent::services::{DriverConfig, SystemPrompt};
    use crate::features::query_agent::tools::registry::{ToolDefinition, ToolRegistry};
    use crate::modules::llm::ContentBlock;
    use crate::shared::clock::SystemClock;
    use crate::shared::retry::RetryPolicy;
    use crate::shared::test_helpers::{
        first_user_text, text_response, tool_call_response, ManualClock, ScriptedModel,
    };

    fn service_over(model: Arc<ScriptedModel>, tools: ToolRegistry) -> QueryService {
        let config = DriverConfig {
            max_iterations: 8,
            model_timeout: Duration::from_secs(5),
            tool_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                backoff_multiplier: 1.0,
            },
        };
        let driver = ConversationDriver::new(
            model,
            Arc::new(tools),
            SystemPrompt::new("Test").unwrap(),
            Arc::new(SystemClock),
            config,
        );
        let cache = ResponseCache::new(
            Duration::from_secs(300),
            Arc::new(ManualClock::at_timestamp(1_700_000_000)),
        );
        QueryService::new(Arc::new(driver), Arc::new(cache))
    }

    #[tokio::test]
    async fn test_repeated_query_is_served_from_cache() {
        let model = Arc::new(ScriptedModel::from_responses(vec![text_response("It is 68F")]));
        let service = service_over(Arc::clone(&model), ToolRegistry::new());

        let first = service.answer("What is the temperature?", true).await.unwrap();
        let second = service
            .answer("  what IS the temperature? ", true)
            .await
            .unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.response, first.response);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_use_cache_false_skips_lookup_and_store() {
        let model = Arc::new(ScriptedModel::from_responses(vec![text_response("fresh")]));
        let service = service_over(Arc::clone(&model), ToolRegistry::new());

        service.answer("rain?", true).await.unwrap();
        let uncached = service.answer("rain?", false).await.unwrap();
        assert!(!uncached.cached);
        assert_eq!(model.calls(), 2);

        service.cache().clear();
        service.answer("wind?", false).await.unwrap();
        assert_eq!(service.cache().stats().size, 0);
        assert_eq!(service.cache().stats().hits + service.cache().stats().misses, 0);
    }

    #[tokio::test]
    async fn test_failed_answers_are_not_cached() {
        let model = Arc::new(ScriptedModel::new(|index, _| {
            if index < 2 {
                Err(crate::modules::llm::ModelError::Api {
                    status: 500,
                    message: "upstream".to_string(),
                })
            } else {
                Ok(text_response("recovered"))
            }
        }));
        let service = service_over(Arc::clone(&model), ToolRegistry::new());

        let error = service.answer("q", true).await.unwrap_err();
        assert!(matches!(error, AppError::ExternalServiceError(_)));
        assert_eq!(service.cache().stats().size, 0);

        let answer = service.answer("q", true).await.unwrap();
        assert_eq!(answer.response, "recovered");
        assert!(!answer.cached);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tool_fault_does_not_affect_concurrent_request() {
        let steady_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&steady_calls);

        let mut tools = ToolRegistry::new();
        tools.register_fn(
            ToolDefinition::new("broken_sensor", "Always panics"),
            |_args: Value| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if true {
                    panic!("corrupt archive page");
                }
                Ok(json!({}))
            },
        );
        tools.register_fn(
            ToolDefinition::new("get_current_conditions", "Latest reading"),
            move |_args: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"temperature": 68.0}))
                }
            },
        );

        let model = Arc::new(ScriptedModel::new(|_, request| {
            let query = first_user_text(request);
            if request.messages.len() == 1 {
                let tool = if query.contains("broken") {
                    "broken_sensor"
                } else {
                    "get_current_conditions"
                };
                Ok(tool_call_response("toolu_1", tool, json!({})))
            } else if query.contains("broken") {
                Ok(text_response("Sensor data is unavailable."))
            } else {
                Ok(text_response("It is 68F"))
            }
        }));
        let service = Arc::new(service_over(Arc::clone(&model), tools));

        let faulty = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.answer("broken sensor?", false).await })
        };
        let healthy = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.answer("temperature?", false).await })
        };

        let healthy = healthy.await.unwrap().unwrap();
        let faulty = faulty.await.unwrap().unwrap();

        assert_eq!(healthy.response, "It is 68F");
        assert_eq!(faulty.response, "Sensor data is unavailable.");
        assert_eq!(steady_calls.load(Ordering::SeqCst), 1);

        let fed_back = model
            .requests()
            .into_iter()
            .filter(|r| first_user_text(r).contains("broken") && r.messages.len() == 3)
            .flat_map(|r| r.messages[2].content.clone())
            .find_map(|block| match block {
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => Some((content, is_error)),
                _ => None,
            })
            .unwrap();
        assert!(fed_back.1);
        assert!(fed_back.0.contains("corrupt archive page"));
    }

    #[tokio::test]
    async fn test_panicking_conversation_fails_only_its_request() {
        let model = Arc::new(ScriptedModel::new(|_, request| {
            if first_user_text(request).contains("crash") {
                panic!("model client bug");
            }
            Ok(text_response("fine"))
        }));
        let service = service_over(model, ToolRegistry::new());

        let error = service.answer("crash please", true).await.unwrap_err();
        assert!(matches!(error, AppError::Internal(_)));

        let answer = service.answer("all good?", true).await.unwrap();
        assert_eq!(answer.response, "fine");
    }

    #[tokio::test]
    async fn test_stream_bypasses_cache() {
        let model = Arc::new(ScriptedModel::from_responses(vec![text_response("68F")]));
        let service = service_over(Arc::clone(&model), ToolRegistry::new());
        service.answer("temp", true).await.unwrap();

        let mut rx = service.stream("temp");
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(model.calls(), 2);
        let stats = service.cache().stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }
}
