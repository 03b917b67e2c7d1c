use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::core::error::{AppError, Result};
use crate::shared::validation::ISO_DATE_REGEX;

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Inclusive archive window in epoch seconds, parsed from station-local ISO dates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
    /// Human-facing "<start> to <end>" as the caller wrote it
    pub period: String,
}

impl DateRange {
    /// Parse a range; a bare end date covers that whole day
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let (start, end) = (start.trim(), end.trim());
        let start_ts = parse_bound(start, Bound::Start)?;
        let end_ts = parse_bound(end, Bound::End)?;

        if start_ts > end_ts {
            return Err(AppError::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        Ok(Self {
            start: start_ts,
            end: end_ts,
            period: format!("{} to {}", start, end),
        })
    }
}

fn parse_bound(raw: &str, bound: Bound) -> Result<i64> {
    if !ISO_DATE_REGEX.is_match(raw) {
        return Err(AppError::Validation(format!(
            "Invalid date '{}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]",
            raw
        )));
    }

    let invalid = || AppError::Validation(format!("Invalid date '{}'", raw));

    let naive = if raw.len() == 10 {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(invalid)?,
        };
        date.and_time(time)
    } else {
        let normalized = raw.replacen(' ', "T", 1);
        NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M"))
            .map_err(|_| invalid())?
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(invalid)
}

/// Archive epoch seconds as station-local time
pub fn local_time(timestamp: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.with_timezone(&Local))
}
