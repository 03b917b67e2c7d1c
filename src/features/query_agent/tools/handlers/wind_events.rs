use serde_json::Value;

use crate::features::archive::models::DateRange;
use crate::features::archive::ArchiveService;
use crate::features::query_agent::error::ToolError;
use crate::features::query_agent::tools::definitions::WindEventArgs;

use super::{parse_args, to_value};

/// Handle the `find_wind_events` tool call
pub async fn handle_wind_events(args: Value, archive: &ArchiveService) -> Result<Value, ToolError> {
    let args: WindEventArgs = parse_args(args)?;
    if !args.min_speed.is_finite() || args.min_speed < 0.0 {
        return Err(ToolError::Validation(format!(
            "min_speed must be a non-negative number, got {}",
            args.min_speed
        )));
    }

    let range = DateRange::parse(&args.start_date, &args.end_date)?;
    let events = archive.wind_events(args.min_speed, &range).await?;

    tracing::debug!("find_wind_events matched {} readings", events.len());
    to_value(&events)
}
