// These functions read the local clock. Triggers evaluated by the ledger use the
// ledger clock, so a local timestamp is only an estimate of when a task fires.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Seconds timestamps, signed like the ledger clock
pub type UnixTimestamp = i64;

#[inline]
pub fn get_current_time() -> Duration {
    // a clock set before 1970 is reported as the epoch itself
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> UnixTimestamp {
    get_current_time().as_secs() as UnixTimestamp
}

// Timestamp `delay` from now, used to build time based triggers
pub fn timestamp_in(delay: Duration) -> UnixTimestamp {
    get_current_time_in_seconds().saturating_add(delay.as_secs() as UnixTimestamp)
}
