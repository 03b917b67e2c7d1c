use serde_json::Value;

use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;
use crate::features::query_agent::tools::definitions::DateRangeArgs;

use super::{parse_args, to_value};

/// Handle the `query_temperature_range` tool call
pub async fn handle_temperature_range(
    args: Value,
    archive: &ArchiveService,
) -> Result<Value, ToolError> {
    let args: DateRangeArgs = parse_args(args)?;
    let range = args.date_range()?;
    to_value(&archive.temperature_range(&range).await?)
}
