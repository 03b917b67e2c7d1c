use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;
use crate::modules::llm::ToolSchema;

use super::definitions::{
    current_conditions_tool, daily_rainfall_tool, humidity_range_tool, pressure_trend_tool,
    rainfall_tool, temperature_range_tool, wind_events_tool,
};
use super::handlers::{
    handle_current_conditions, handle_daily_rainfall, handle_humidity_range,
    handle_pressure_trend, handle_rainfall, handle_temperature_range, handle_wind_events,
};

/// Executes one tool with already-validated arguments
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a `ToolHandler`
pub struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        (self.0)(args).await
    }
}

/// Name, description and JSON input schema of a tool
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Derive the input schema from an argument struct
    pub fn with_args<T: JsonSchema>(self) -> Self {
        self.with_input_schema(input_schema_for::<T>())
    }
}

/// Object schema for `T` in the shape tool-calling APIs expect
pub fn input_schema_for<T: JsonSchema>() -> Value {
    let root = schemars::schema_for!(T);
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| json!({}));

    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object.insert("type".to_string(), json!("object"));
        object.entry("properties").or_insert_with(|| json!({}));
    }

    schema
}

pub struct RegisteredTool {
    pub definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

/// Tool lookup table. Built once at startup and read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a later registration under the same name replaces the earlier one
    pub fn register<H>(&mut self, definition: ToolDefinition, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool = RegisteredTool {
            definition,
            handler: Arc::new(handler),
        };

        match self.index.get(&tool.definition.name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(tool.definition.name.clone(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(definition, FnTool(handler));
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|tool| tool.definition.name.as_str())
            .collect()
    }

    /// Schemas advertised to the model, in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| ToolSchema {
                name: tool.definition.name.clone(),
                description: tool.definition.description.clone(),
                input_schema: tool.definition.input_schema.clone(),
            })
            .collect()
    }

    /// Digest of every tool name and schema; changes whenever the toolset does
    pub fn version(&self) -> String {
        let mut hasher = Sha256::new();
        for tool in &self.tools {
            hasher.update(tool.definition.name.as_bytes());
            hasher.update(b"\n");
            hasher.update(tool.definition.input_schema.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Create a tool registry with all archive analytics tools
pub fn create_tool_registry(archive: Arc<ArchiveService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let service = Arc::clone(&archive);
    registry.register_fn(current_conditions_tool(), move |_args: Value| {
        let service = Arc::clone(&service);
        async move { handle_current_conditions(&service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(temperature_range_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_temperature_range(args, &service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(rainfall_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_rainfall(args, &service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(wind_events_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_wind_events(args, &service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(humidity_range_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_humidity_range(args, &service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(daily_rainfall_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_daily_rainfall(args, &service).await }
    });

    let service = Arc::clone(&archive);
    registry.register_fn(pressure_trend_tool(), move |args: Value| {
        let service = Arc::clone(&service);
        async move { handle_pressure_trend(args, &service).await }
    });

    registry
}
