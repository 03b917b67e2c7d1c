use serde_json::Value;

use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;
use crate::features::query_agent::tools::definitions::DateRangeArgs;

use super::{parse_args, to_value};

/// Handle the `query_humidity_range` tool call
pub async fn handle_humidity_range(
    args: Value,
    archive: &ArchiveService,
) -> Result<Value, ToolError> {
    let args: DateRangeArgs = parse_args(args)?;
    let range = args.date_range()?;
    to_value(&archive.humidity_range(&range).await?)
}
