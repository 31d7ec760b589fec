//! Wall-clock timestamps in microseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
///
/// Probes carry this value on the wire, so both ends must agree on the
/// epoch; a monotonic clock would not do.
#[allow(clippy::cast_possible_truncation)]
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
