//! Wall-clock helpers shared by timing state, audit events, and session handles.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// A clock set before the epoch reads as zero rather than failing.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Add a duration to an epoch-millisecond timestamp.
#[must_use]
pub fn after_ms(base_ms: u128, delay: Duration) -> u128 {
    base_ms.saturating_add(delay.as_millis())
}
