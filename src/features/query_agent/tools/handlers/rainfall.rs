use serde_json::Value;

use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;
use crate::features::query_agent::tools::definitions::DateRangeArgs;

use super::{parse_args, to_value};

/// Handle the `query_rainfall` tool call
pub async fn handle_rainfall(args: Value, archive: &ArchiveService) -> Result<Value, ToolError> {
    let args: DateRangeArgs = parse_args(args)?;
    let range = args.date_range()?;
    to_value(&archive.rainfall(&range).await?)
}

/// Handle the `query_daily_rainfall` tool call
pub async fn handle_daily_rainfall(
    args: Value,
    archive: &ArchiveService,
) -> Result<Value, ToolError> {
    let args: DateRangeArgs = parse_args(args)?;
    let range = args.date_range()?;
    to_value(&archive.daily_rainfall(&range).await?)
}
