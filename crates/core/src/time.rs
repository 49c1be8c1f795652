//! Timestamp conventions.
//!
//! Storage uses unix seconds (BIGINT); chrono types appear only at the
//! edges where calendar math or wire formats need them.

use chrono::Utc;

/// Unix timestamp in whole seconds.
pub type UnixTime = i64;

/// Current unix time in seconds.
pub fn now_unix() -> UnixTime {
    Utc::now().timestamp()
}
