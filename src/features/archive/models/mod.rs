mod archive_record;
mod date_range;

pub use archive_record::{
    ArchiveRecord, ArchiveSnapshot, ColumnStats, DailyRain, RainTotals, WindRecord,
};
pub use date_range::{local_time, DateRange};
