use serde_json::{json, Value};

use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;

use super::to_value;

/// Handle the `get_current_conditions` tool call
pub async fn handle_current_conditions(archive: &ArchiveService) -> Result<Value, ToolError> {
    match archive.current_conditions().await? {
        Some(current) => to_value(&current),
        None => Ok(json!({ "error": "No data found" })),
    }
}
