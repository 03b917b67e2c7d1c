use chrono::{DateTime, Utc};

/// Source of "now" for anything that ages data (cache entries, staleness checks).
///
/// Injected rather than read from the system directly so TTL behaviour can be
/// driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
