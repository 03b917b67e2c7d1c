mod current_conditions;
mod humidity_range;
mod pressure_trend;
mod rainfall;
mod temperature_range;
mod wind_events;

pub use current_conditions::handle_current_conditions;
pub use humidity_range::handle_humidity_range;
pub use pressure_trend::handle_pressure_trend;
pub use rainfall::{handle_daily_rainfall, handle_rainfall};
pub use temperature_range::handle_temperature_range;
pub use wind_events::handle_wind_events;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::features::archive::models::DateRange;
use crate::features::query_agent::error::ToolError;

use super::definitions::DateRangeArgs;

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Validation(e.to_string()))
}

fn to_value<T: Serialize>(result: &T) -> Result<Value, ToolError> {
    serde_json::to_value(result).map_err(|e| ToolError::Execution(e.to_string()))
}

impl DateRangeArgs {
    fn date_range(&self) -> Result<DateRange, ToolError> {
        Ok(DateRange::parse(&self.start_date, &self.end_date)?)
    }
}
