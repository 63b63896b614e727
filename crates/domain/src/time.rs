//! Time helpers for status reports.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp carried by status reports.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
#[must_use]
pub fn as_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
