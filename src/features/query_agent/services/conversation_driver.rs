use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::core::config::{AgentConfig, ModelConfig};
use crate::features::query_agent::error::{AgentError, ToolError};
use crate::features::query_agent::tools::{validate_args, ToolRegistry};
use crate::modules::llm::{
    ContentBlock, Message, ModelClient, ModelError, ModelRequest, ModelResponse, ModelStreamEvent,
    ToolUse,
};
use crate::shared::clock::Clock;
use crate::shared::panic::panic_message;
use crate::shared::retry::RetryPolicy;

use super::prompt::SystemPrompt;
use super::streaming_relay::TokenSink;

/// Limits applied to every conversation
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Model turns allowed before the conversation is abandoned
    pub max_iterations: u32,
    /// Per model call; on the streaming path, the longest gap between events
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
}

impl DriverConfig {
    pub fn from_config(agent: &AgentConfig, model: &ModelConfig) -> Self {
        Self {
            max_iterations: agent.max_iterations,
            model_timeout: model.timeout,
            tool_timeout: agent.tool_timeout,
            retry: agent.retry.clone(),
        }
    }
}

/// Transcript and turn counter of one conversation
struct ConversationState {
    messages: Vec<Message>,
    iterations: u32,
    max_iterations: u32,
}

impl ConversationState {
    fn new(query: &str, max_iterations: u32) -> Self {
        Self {
            messages: vec![Message::user_text(query)],
            iterations: 0,
            max_iterations,
        }
    }

    fn begin_model_turn(&mut self) -> Result<u32, AgentError> {
        self.iterations += 1;
        if self.iterations > self.max_iterations {
            return Err(AgentError::LoopBoundExceeded(self.max_iterations));
        }
        Ok(self.iterations)
    }

    /// Append the assistant's tool-use turn followed by its results
    fn record_tool_round(&mut self, assistant: Vec<ContentBlock>, results: Vec<ContentBlock>) {
        self.messages.push(Message::assistant(assistant));
        self.messages.push(Message::tool_results(results));
    }
}

#[derive(Clone, Copy)]
enum TurnMode<'a> {
    Complete,
    Stream(&'a TokenSink),
}

/// Runs the tool-call dispatch loop against the model service.
///
/// `answer` and `answer_stream` share one loop; they only differ in how a
/// model turn is awaited. Tool dispatch between turns is identical.
pub struct ConversationDriver {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    prompt: SystemPrompt,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
}

impl ConversationDriver {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        prompt: SystemPrompt,
        clock: Arc<dyn Clock>,
        config: DriverConfig,
    ) -> Self {
        Self {
            model,
            tools,
            prompt,
            clock,
            config,
        }
    }

    /// Run the conversation to completion and return the final answer text
    pub async fn answer(&self, query: &str) -> Result<String, AgentError> {
        self.run(query, TurnMode::Complete)
            .instrument(conversation_span("sync"))
            .await
    }

    /// Same loop as `answer`, forwarding text deltas to `sink` as they arrive.
    ///
    /// Returns `AgentError::Cancelled` as soon as the sink's consumer goes away.
    pub async fn answer_stream(&self, query: &str, sink: &TokenSink) -> Result<String, AgentError> {
        self.run(query, TurnMode::Stream(sink))
            .instrument(conversation_span("stream"))
            .await
    }

    async fn run(&self, query: &str, mode: TurnMode<'_>) -> Result<String, AgentError> {
        let system = self
            .prompt
            .render(self.clock.now().with_timezone(&Local))?;
        let tools = self.tools.schemas();
        let mut state = ConversationState::new(query, self.config.max_iterations);

        loop {
            let iteration = match state.begin_model_turn() {
                Ok(iteration) => iteration,
                Err(e) => {
                    warn!("Conversation abandoned: {}", e);
                    return Err(e);
                }
            };

            let request = ModelRequest {
                system: system.clone(),
                messages: state.messages.clone(),
                tools: tools.clone(),
            };

            let response = match mode {
                TurnMode::Complete => self.complete_turn(&request).await?,
                TurnMode::Stream(sink) => self.stream_turn(&request, sink).await?,
            };

            let tool_uses = response.tool_uses();
            if tool_uses.is_empty() {
                info!(iteration, "Conversation finished");
                return Ok(response.text());
            }

            debug!(
                iteration,
                tool_calls = tool_uses.len(),
                "Model requested tools"
            );

            let results = match mode {
                TurnMode::Complete => self.dispatch(&tool_uses).await,
                TurnMode::Stream(sink) => {
                    tokio::select! {
                        biased;
                        _ = sink.closed() => return Err(AgentError::Cancelled),
                        results = self.dispatch(&tool_uses) => results,
                    }
                }
            };

            state.record_tool_round(response.replayable_content(), results);
        }
    }

    async fn complete_turn(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let timeout = self.config.model_timeout;
        let model = &self.model;

        let response = self
            .config
            .retry
            .execute(
                "model_turn",
                |_| async move {
                    match tokio::time::timeout(timeout, model.complete(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(ModelError::Timeout(timeout)),
                    }
                },
                ModelError::is_transient,
            )
            .await?;

        Ok(response)
    }

    /// A turn is retried as a whole (open plus consume) while none of its
    /// text has reached the client. After the first forwarded delta a failure
    /// is terminal so no token is ever delivered twice.
    async fn stream_turn(
        &self,
        request: &ModelRequest,
        sink: &TokenSink,
    ) -> Result<ModelResponse, AgentError> {
        self.config
            .retry
            .execute(
                "model_stream_turn",
                |_| self.stream_attempt(request, sink),
                StreamFailure::is_retryable,
            )
            .await
            .map_err(|failure| failure.error)
    }

    async fn stream_attempt(
        &self,
        request: &ModelRequest,
        sink: &TokenSink,
    ) -> Result<ModelResponse, StreamFailure> {
        let timeout = self.config.model_timeout;
        let mut forwarded = false;

        let opened = match tokio::time::timeout(timeout, self.model.stream(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(timeout)),
        };
        let mut events = opened.map_err(|e| StreamFailure::new(e.into(), forwarded))?;

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => {
                    return Err(StreamFailure::new(AgentError::Cancelled, forwarded));
                }
                next = tokio::time::timeout(timeout, events.next()) => next,
            };

            let event = match next {
                Err(_) => Err(ModelError::Timeout(timeout)),
                Ok(None) => Err(ModelError::Stream(
                    "stream ended before the turn completed".to_string(),
                )),
                Ok(Some(event)) => event,
            };

            match event.map_err(|e| StreamFailure::new(e.into(), forwarded))? {
                ModelStreamEvent::TextDelta(text) => {
                    if !text.is_empty() {
                        sink.token(text).await.map_err(|e| StreamFailure::new(e, forwarded))?;
                        forwarded = true;
                    }
                }
                ModelStreamEvent::ToolUseBegin { id, name } => {
                    debug!(tool = %name, tool_use_id = %id, "Model is preparing a tool call");
                }
                ModelStreamEvent::Completed(response) => return Ok(response),
            }
        }
    }

    /// Invoke every requested tool in order; failures become error results
    async fn dispatch(&self, tool_uses: &[ToolUse]) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(tool_uses.len());

        for tool_use in tool_uses {
            let started = Instant::now();
            let outcome = self.invoke(tool_use).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let block = match outcome {
                Ok(value) => {
                    info!(
                        tool = %tool_use.name,
                        tool_use_id = %tool_use.id,
                        elapsed_ms,
                        "Tool call succeeded"
                    );
                    let content =
                        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                    ContentBlock::tool_result(&tool_use.id, content, false)
                }
                Err(e) => {
                    warn!(
                        tool = %tool_use.name,
                        tool_use_id = %tool_use.id,
                        elapsed_ms,
                        "Tool call failed: {}",
                        e
                    );
                    ContentBlock::tool_result(&tool_use.id, e.to_result_value().to_string(), true)
                }
            };

            results.push(block);
        }

        results
    }

    async fn invoke(&self, tool_use: &ToolUse) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&tool_use.name)
            .ok_or_else(|| ToolError::UnknownTool(tool_use.name.clone()))?;

        let args = validate_args(&tool.definition.input_schema, &tool_use.input)?;
        let handler = tool.handler();
        let timeout = self.config.tool_timeout;

        self.config
            .retry
            .execute(
                &tool_use.name,
                |_| {
                    let handler = Arc::clone(&handler);
                    let args = args.clone();
                    async move {
                        let call = AssertUnwindSafe(handler.call(args)).catch_unwind();
                        match tokio::time::timeout(timeout, call).await {
                            Ok(Ok(result)) => result,
                            Ok(Err(payload)) => Err(ToolError::Execution(format!(
                                "tool panicked: {}",
                                panic_message(payload.as_ref())
                            ))),
                            Err(_) => Err(ToolError::Timeout(timeout)),
                        }
                    }
                },
                ToolError::is_transient,
            )
            .await
    }
}

/// A failed streaming attempt, and whether it had already sent text
struct StreamFailure {
    error: AgentError,
    forwarded: bool,
}

impl StreamFailure {
    fn new(error: AgentError, forwarded: bool) -> Self {
        Self { error, forwarded }
    }

    fn is_retryable(&self) -> bool {
        !self.forwarded && matches!(&self.error, AgentError::ModelService(e) if e.is_transient())
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

fn conversation_span(mode: &'static str) -> tracing::Span {
    tracing::info_span!("conversation", id = %Uuid::now_v7(), mode)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::features::query_agent::services::StreamEvent;
    use crate::features::query_agent::tools::registry::ToolDefinition;
    use crate::shared::clock::SystemClock;
    use crate::shared::test_helpers::{
        text_response, tokens_response, tool_call_response, ScriptedModel,
    };

    fn fast_config(max_iterations: u32) -> DriverConfig {
        DriverConfig {
            max_iterations,
            model_timeout: Duration::from_secs(5),
            tool_timeout: Duration::from_millis(200),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                backoff_multiplier: 2.0,
            },
        }
    }

    fn build_driver(
        model: Arc<ScriptedModel>,
        tools: ToolRegistry,
        max_iterations: u32,
    ) -> ConversationDriver {
        build_driver_with(model, tools, fast_config(max_iterations))
    }

    fn build_driver_with(
        model: Arc<ScriptedModel>,
        tools: ToolRegistry,
        config: DriverConfig,
    ) -> ConversationDriver {
        ConversationDriver::new(
            model,
            Arc::new(tools),
            SystemPrompt::new("Test").unwrap(),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Fast retries with a short model timeout, for paused-clock tests
    fn impatient_config() -> DriverConfig {
        DriverConfig {
            model_timeout: Duration::from_millis(100),
            ..fast_config(8)
        }
    }

    /// Run a streaming answer and collect the forwarded tokens
    async fn stream_tokens(
        driver: &ConversationDriver,
        query: &str,
    ) -> (Result<String, AgentError>, Vec<String>) {
        let (tx, mut rx) = mpsc::channel(64);
        let sink = TokenSink::new(tx);
        let result = driver.answer_stream(query, &sink).await;
        drop(sink);

        let mut tokens = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token { text } => tokens.push(text),
                other => panic!("unexpected event {:?}", other),
            }
        }
        (result, tokens)
    }

    /// Registry with a `get_current_conditions` tool that counts its calls
    fn counting_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("get_current_conditions", "Latest reading"),
            move |_args: Value| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"temperature": 68.0}))
                }
            },
        );
        registry
    }

    fn tool_results(request: &ModelRequest) -> Vec<(String, bool)> {
        request
            .messages
            .last()
            .map(|message| {
                message
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult {
                            content, is_error, ..
                        } => Some((content.clone(), *is_error)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_single_tool_round_then_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(ScriptedModel::from_responses(vec![
            tool_call_response("toolu_1", "get_current_conditions", json!({})),
            text_response("It is 68F"),
        ]));
        let driver = build_driver(Arc::clone(&model), counting_registry(Arc::clone(&calls)), 8);

        let answer = driver.answer("What is the temperature?").await.unwrap();

        assert_eq!(answer, "It is 68F");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.calls(), 2);

        let second = &model.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.tools.len(), 1);
        let results = tool_results(second);
        assert_eq!(results.len(), 1);
        assert!(!results[0].1);
        assert!(results[0].0.contains("68"));
    }

    #[tokio::test]
    async fn test_k_tool_rounds_invoke_k_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let k = 4;
        let model = Arc::new(ScriptedModel::new(move |index, _request| {
            if index < k {
                Ok(tool_call_response(
                    &format!("toolu_{}", index),
                    "get_current_conditions",
                    json!({}),
                ))
            } else {
                Ok(text_response("done"))
            }
        }));
        let driver = build_driver(Arc::clone(&model), counting_registry(Arc::clone(&calls)), 8);

        assert_eq!(driver.answer("q").await.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), k);
        assert_eq!(model.calls(), k + 1);
    }

    #[tokio::test]
    async fn test_tool_results_keep_request_order() {
        let mut registry = ToolRegistry::new();
        for name in ["first", "second"] {
            registry.register_fn(ToolDefinition::new(name, name), move |_args: Value| async move {
                Ok(json!({ "tool": name }))
            });
        }
        let model = Arc::new(ScriptedModel::new(|index, _request| {
            if index == 0 {
                Ok(ModelResponse {
                    content: vec![
                        ContentBlock::tool_use("a", "second", json!({})),
                        ContentBlock::tool_use("b", "first", json!({})),
                    ],
                    stop_reason: Some("tool_use".to_string()),
                })
            } else {
                Ok(text_response("ok"))
            }
        }));
        let driver = build_driver(Arc::clone(&model), registry, 8);

        driver.answer("q").await.unwrap();

        let second = &model.requests()[1];
        let ids: Vec<&str> = second.messages[2]
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back_and_loop_continues() {
        for name in ["bogus", "does_not_exist"] {
            let model = Arc::new(ScriptedModel::from_responses(vec![
                tool_call_response("toolu_1", name, json!({})),
                text_response("Sorry, I could not look that up."),
            ]));
            let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);

            let answer = driver.answer("q").await.unwrap();
            assert_eq!(answer, "Sorry, I could not look that up.");

            let results = tool_results(&model.requests()[1]);
            assert_eq!(
                results,
                vec![(format!(r#"{{"error":"Unknown tool: {}"}}"#, name), true)]
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("query_rainfall", "Rain").with_input_schema(json!({
                "type": "object",
                "properties": {"start_date": {"type": "string"}, "end_date": {"type": "string"}},
                "required": ["start_date", "end_date"]
            })),
            move |_args: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({}))
                }
            },
        );
        let model = Arc::new(ScriptedModel::from_responses(vec![
            tool_call_response("toolu_1", "query_rainfall", json!({"start_date": "2024-01-01"})),
            text_response("Which end date?"),
        ]));
        let driver = build_driver(Arc::clone(&model), registry, 8);

        driver.answer("rain?").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let results = tool_results(&model.requests()[1]);
        assert!(results[0].1);
        assert!(results[0].0.contains("end_date"));
    }

    #[tokio::test]
    async fn test_loop_bound_stops_runaway_tool_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(ScriptedModel::new(|index, _request| {
            Ok(tool_call_response(
                &format!("toolu_{}", index),
                "get_current_conditions",
                json!({}),
            ))
        }));
        let driver = build_driver(Arc::clone(&model), counting_registry(Arc::clone(&calls)), 3);

        let error = driver.answer("q").await.unwrap_err();

        assert!(matches!(error, AgentError::LoopBoundExceeded(3)));
        assert_eq!(model.calls(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_model_errors_are_retried() {
        let model = Arc::new(ScriptedModel::new(|index, _request| {
            if index < 2 {
                Err(ModelError::Api {
                    status: 529,
                    message: "overloaded".to_string(),
                })
            } else {
                Ok(text_response("It is 68F"))
            }
        }));
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);

        assert_eq!(driver.answer("q").await.unwrap(), "It is 68F");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_or_permanent_model_errors_end_the_conversation() {
        let model = Arc::new(ScriptedModel::new(|_, _| {
            Err(ModelError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        }));
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);
        assert!(matches!(
            driver.answer("q").await,
            Err(AgentError::ModelService(_))
        ));
        assert_eq!(model.calls(), 3);

        let model = Arc::new(ScriptedModel::new(|_, _| {
            Err(ModelError::Api {
                status: 400,
                message: "bad request".to_string(),
            })
        }));
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);
        assert!(driver.answer("q").await.is_err());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_tool_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("get_current_conditions", "Latest reading"),
            move |_args: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ToolError::Unavailable("database is locked".to_string()))
                    } else {
                        Ok(json!({"temperature": 70.0}))
                    }
                }
            },
        );
        let model = Arc::new(ScriptedModel::from_responses(vec![
            tool_call_response("toolu_1", "get_current_conditions", json!({})),
            text_response("It is 70F"),
        ]));
        let driver = build_driver(Arc::clone(&model), registry, 8);

        assert_eq!(driver.answer("q").await.unwrap(), "It is 70F");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!tool_results(&model.requests()[1])[0].1);
    }

    #[tokio::test]
    async fn test_tool_panic_and_timeout_become_error_results() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("explode", "Always panics"),
            |_args: Value| async move {
                if true {
                    panic!("sensor table missing");
                }
                Ok(json!({}))
            },
        );
        registry.register_fn(
            ToolDefinition::new("hang", "Never finishes in time"),
            |_args: Value| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(json!({}))
            },
        );
        let model = Arc::new(ScriptedModel::new(|index, _request| {
            if index == 0 {
                Ok(ModelResponse {
                    content: vec![
                        ContentBlock::tool_use("a", "explode", json!({})),
                        ContentBlock::tool_use("b", "hang", json!({})),
                    ],
                    stop_reason: Some("tool_use".to_string()),
                })
            } else {
                Ok(text_response("The archive is having trouble."))
            }
        }));
        let driver = build_driver(Arc::clone(&model), registry, 8);

        let answer = driver.answer("q").await.unwrap();
        assert_eq!(answer, "The archive is having trouble.");

        let results = tool_results(&model.requests()[1]);
        assert!(results[0].1);
        assert!(results[0].0.contains("tool panicked: sensor table missing"));
        assert!(results[1].1);
        assert!(results[1].0.contains("timed out"));
    }

    #[tokio::test]
    async fn test_answer_stream_forwards_tokens_across_tool_rounds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(ScriptedModel::from_responses(vec![
            tool_call_response("toolu_1", "get_current_conditions", json!({})),
            tokens_response(&["It", " is", " 68F"]),
        ]));
        let driver = build_driver(Arc::clone(&model), counting_registry(Arc::clone(&calls)), 8);

        let (tx, mut rx) = mpsc::channel(16);
        let sink = TokenSink::new(tx);
        let answer = driver.answer_stream("temperature?", &sink).await.unwrap();
        drop(sink);

        let mut tokens = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token { text } => tokens.push(text),
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert_eq!(answer, "It is 68F");
        assert_eq!(tokens, vec!["It", " is", " 68F"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_not_retried() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["It", " is", " 68F"])])
                .failing_stream_after(2),
        );
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);

        let (result, tokens) = stream_tokens(&driver, "q").await;

        // Transport errors are transient, but tokens already went out
        assert!(matches!(
            result,
            Err(AgentError::ModelService(ModelError::Transport(_)))
        ));
        assert_eq!(tokens, vec!["It", " is"]);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_is_retried() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![text_response("It is 68F")]).stalling_first(1),
        );
        let driver = build_driver_with(Arc::clone(&model), ToolRegistry::new(), impatient_config());

        assert_eq!(driver.answer("q").await.unwrap(), "It is 68F");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_exhausts_retries() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![text_response("never")]).stalling_first(usize::MAX),
        );
        let driver = build_driver_with(Arc::clone(&model), ToolRegistry::new(), impatient_config());

        let error = driver.answer("q").await.unwrap_err();

        assert!(matches!(
            error,
            AgentError::ModelService(ModelError::Timeout(_))
        ));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_open_timeout_is_retried() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["ok"])]).stalling_first(1),
        );
        let driver = build_driver_with(Arc::clone(&model), ToolRegistry::new(), impatient_config());

        let (result, tokens) = stream_tokens(&driver, "q").await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(tokens, vec!["ok"]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_is_retried_before_any_token() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["It", " is", " 68F"])])
                .silent_streams_first(1),
        );
        let driver = build_driver_with(Arc::clone(&model), ToolRegistry::new(), impatient_config());

        let (result, tokens) = stream_tokens(&driver, "q").await;

        assert_eq!(result.unwrap(), "It is 68F");
        assert_eq!(tokens, vec!["It", " is", " 68F"]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_exhausts_retries() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["never"])])
                .silent_streams_first(usize::MAX),
        );
        let driver = build_driver_with(Arc::clone(&model), ToolRegistry::new(), impatient_config());

        let (result, tokens) = stream_tokens(&driver, "q").await;

        assert!(matches!(
            result,
            Err(AgentError::ModelService(ModelError::Timeout(_)))
        ));
        assert!(tokens.is_empty());
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_overloaded_stream_before_tokens_is_retried() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["It", " is", " 68F"])])
                .interrupting_streams(
                    1,
                    0,
                    ModelError::Api {
                        status: 529,
                        message: "overloaded_error: Overloaded".to_string(),
                    },
                ),
        );
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);

        let (result, tokens) = stream_tokens(&driver, "q").await;

        assert_eq!(result.unwrap(), "It is 68F");
        assert_eq!(tokens, vec!["It", " is", " 68F"]);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_tool_turn_stream_failure_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(
            ScriptedModel::new(|_index, request| {
                if request.messages.len() == 1 {
                    Ok(tool_call_response("toolu_1", "get_current_conditions", json!({})))
                } else {
                    Ok(tokens_response(&["68F"]))
                }
            })
            .interrupting_streams(1, 1, ModelError::Transport("connection reset".to_string())),
        );
        let driver = build_driver(Arc::clone(&model), counting_registry(Arc::clone(&calls)), 8);

        let (result, tokens) = stream_tokens(&driver, "temperature?").await;

        assert_eq!(result.unwrap(), "68F");
        assert_eq!(tokens, vec!["68F"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_stream_error_is_not_retried() {
        let model = Arc::new(
            ScriptedModel::from_responses(vec![tokens_response(&["ok"])]).interrupting_streams(
                usize::MAX,
                0,
                ModelError::Stream("invalid_request_error: prompt is too long".to_string()),
            ),
        );
        let driver = build_driver(Arc::clone(&model), ToolRegistry::new(), 8);

        let (result, tokens) = stream_tokens(&driver, "q").await;

        assert!(matches!(result, Err(AgentError::ModelService(_))));
        assert!(tokens.is_empty());
        assert_eq!(model.calls(), 1);
    }
}
