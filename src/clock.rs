//! Millisecond clock used for event keys and record timestamps.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds since the Unix epoch.
///
/// Never returns a value smaller than a previous call in the same process,
/// even if the system clock steps backwards.
pub fn current_time_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_MILLIS.fetch_max(now, Ordering::SeqCst);
    previous.max(now)
}
