//! Database query modules.

pub mod jobs;
pub mod steps;
pub mod triggers;

use chrono::Utc;

/// Wall-clock timestamp for human-facing columns.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Epoch milliseconds, used for lease and scheduling comparisons.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
