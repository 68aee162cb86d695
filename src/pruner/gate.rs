//! Threshold gate: the pure expiration predicate.

use std::time::{Duration, SystemTime};

/// Whether `timestamp` is strictly older than `max_age` relative to `now`.
///
/// The boundary is exclusive: an entry aged exactly `max_age` is NOT expired.
/// Timestamps at or after `now` (clock skew, files touched mid-run) are never
/// expired.
#[must_use]
pub fn is_expired(timestamp: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    now.duration_since(timestamp)
        .is_ok_and(|age| age > max_age)
}

/// Whether an entry with the given timestamps is expired as a whole.
///
/// Both mtime and atime must individually pass the gate; either one being
/// recent keeps the entry alive.
#[must_use]
pub fn entry_expired(
    mtime: SystemTime,
    atime: SystemTime,
    now: SystemTime,
    max_age: Duration,
) -> bool {
    is_expired(mtime, now, max_age) && is_expired(atime, now, max_age)
}
