use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::modules::llm::{
    ContentBlock, ModelClient, ModelError, ModelEventStream, ModelRequest, ModelResponse,
    ModelStreamEvent,
};
use crate::shared::clock::Clock;

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at_timestamp(secs: i64) -> Self {
        Self {
            now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Epoch seconds of a station-local `YYYY-MM-DDTHH:MM:SS`
pub fn local_ts(value: &str) -> i64 {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").unwrap();
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap()
        .timestamp()
}

/// In-memory archive with the WeeWX `archive` table layout
pub async fn archive_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::query(
        r#"
        CREATE TABLE archive (
            dateTime INTEGER NOT NULL PRIMARY KEY,
            usUnits INTEGER NOT NULL DEFAULT 1,
            interval INTEGER NOT NULL DEFAULT 5,
            outTemp REAL,
            outHumidity REAL,
            barometer REAL,
            windSpeed REAL,
            windGust REAL,
            windDir REAL,
            rain REAL,
            rainRate REAL,
            dewpoint REAL
        )
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    pool
}

/// One archive row; unset columns stay NULL
#[derive(Debug, Clone, Default)]
pub struct Reading {
    pub date_time: i64,
    pub out_temp: Option<f64>,
    pub out_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_dir: Option<f64>,
    pub rain: Option<f64>,
    pub rain_rate: Option<f64>,
    pub dewpoint: Option<f64>,
}

impl Reading {
    pub fn at(local: &str) -> Self {
        Self {
            date_time: local_ts(local),
            ..Default::default()
        }
    }

    pub fn temp(mut self, value: f64) -> Self {
        self.out_temp = Some(value);
        self
    }

    pub fn humidity(mut self, value: f64) -> Self {
        self.out_humidity = Some(value);
        self
    }

    pub fn barometer(mut self, value: f64) -> Self {
        self.barometer = Some(value);
        self
    }

    pub fn wind(mut self, speed: f64, gust: f64) -> Self {
        self.wind_speed = Some(speed);
        self.wind_gust = Some(gust);
        self.wind_dir = Some(270.0);
        self
    }

    pub fn rain(mut self, amount: f64, rate: f64) -> Self {
        self.rain = Some(amount);
        self.rain_rate = Some(rate);
        self
    }
}

pub async fn insert_reading(pool: &SqlitePool, reading: &Reading) {
    sqlx::query(
        r#"
        INSERT INTO archive
            (dateTime, outTemp, outHumidity, barometer, windSpeed, windGust, windDir,
             rain, rainRate, dewpoint)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(reading.date_time)
    .bind(reading.out_temp)
    .bind(reading.out_humidity)
    .bind(reading.barometer)
    .bind(reading.wind_speed)
    .bind(reading.wind_gust)
    .bind(reading.wind_dir)
    .bind(reading.rain)
    .bind(reading.rain_rate)
    .bind(reading.dewpoint)
    .execute(pool)
    .await
    .unwrap();
}

pub fn text_response(text: &str) -> ModelResponse {
    tokens_response(&[text])
}

/// A final answer delivered as several text blocks, streamed one delta each
pub fn tokens_response(tokens: &[&str]) -> ModelResponse {
    ModelResponse {
        content: tokens.iter().map(|t| ContentBlock::text(*t)).collect(),
        stop_reason: Some("end_turn".to_string()),
    }
}

pub fn tool_call_response(id: &str, name: &str, input: Value) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::tool_use(id, name, input)],
        stop_reason: Some("tool_use".to_string()),
    }
}

/// Text of the first user turn, i.e. the original query
pub fn first_user_text(request: &ModelRequest) -> String {
    request
        .messages
        .first()
        .map(|message| {
            message
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

type Script = dyn Fn(usize, &ModelRequest) -> Result<ModelResponse, ModelError> + Send + Sync;

/// Streams of the first `calls` calls break with `error` after `after` events
struct StreamFault {
    calls: usize,
    after: usize,
    error: ModelError,
}

/// Model stub driven by a script over (call index, request)
pub struct ScriptedModel {
    script: Box<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
    stalled_calls: usize,
    silent_streams: usize,
    stream_fault: Option<StreamFault>,
}

impl ScriptedModel {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &ModelRequest) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            stalled_calls: 0,
            silent_streams: 0,
            stream_fault: None,
        }
    }

    /// Answer call `i` with `responses[i]`, repeating the last one afterwards
    pub fn from_responses(responses: Vec<ModelResponse>) -> Self {
        Self::new(move |index, _request| {
            let last = responses.len().saturating_sub(1);
            Ok(responses[index.min(last)].clone())
        })
    }

    /// Every stream breaks with a transport error after this many events
    pub fn failing_stream_after(self, events: usize) -> Self {
        self.interrupting_streams(
            usize::MAX,
            events,
            ModelError::Transport("connection reset".to_string()),
        )
    }

    /// Streams of the first `calls` calls fail with `error` after `after` events
    pub fn interrupting_streams(mut self, calls: usize, after: usize, error: ModelError) -> Self {
        self.stream_fault = Some(StreamFault {
            calls,
            after,
            error,
        });
        self
    }

    /// The first `calls` calls never answer
    pub fn stalling_first(mut self, calls: usize) -> Self {
        self.stalled_calls = calls;
        self
    }

    /// The first `calls` streams open but never yield an event
    pub fn silent_streams_first(mut self, calls: usize) -> Self {
        self.silent_streams = calls;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn begin_call(&self, request: &ModelRequest) -> usize {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if index < self.stalled_calls {
            std::future::pending::<()>().await;
        }
        index
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let index = self.begin_call(request).await;
        (self.script)(index, request)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ModelEventStream, ModelError> {
        let index = self.begin_call(request).await;
        if index < self.silent_streams {
            return Ok(Box::pin(futures::stream::pending()));
        }
        let response = (self.script)(index, request)?;

        let mut events: Vec<Result<ModelStreamEvent, ModelError>> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(Ok(ModelStreamEvent::TextDelta(text.clone()))),
                ContentBlock::ToolUse { id, name, .. } => Some(Ok(ModelStreamEvent::ToolUseBegin {
                    id: id.clone(),
                    name: name.clone(),
                })),
                _ => None,
            })
            .collect();
        events.push(Ok(ModelStreamEvent::Completed(response)));

        if let Some(fault) = self.stream_fault.as_ref().filter(|f| index < f.calls) {
            events.truncate(fault.after);
            events.push(Err(fault.error.clone()));
        }

        Ok(Box::pin(futures::stream::iter(events)))
    }
}
