//! Cache validity from filesystem timestamps.
//!
//! Timestamps are compared at whole-second resolution, the granularity of
//! HTTP dates, so a cache file written in the same second as its source is
//! never considered fresh.

use std::{
    fs,
    path::Path,
    time::{Duration, SystemTime},
};

use chrono::{DateTime, TimeDelta, Utc};

/// Whether a cache file stamped `cache_mtime` may stand in for a source
/// stamped `source_mtime` at `now`.
///
/// A missing timestamp (file vanished, unreadable metadata) is a miss, never
/// an error. The source must be strictly older than the cache file and the
/// cache file must be strictly younger than `expiry`. A zero expiry is
/// accepted and makes every entry stale.
pub fn is_fresh(
    cache_mtime: Option<DateTime<Utc>>,
    source_mtime: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    expiry: Duration,
) -> bool {
    let (Some(cache_mtime), Some(source_mtime)) = (cache_mtime, source_mtime) else {
        return false;
    };

    if source_mtime >= cache_mtime {
        return false;
    }

    match expires_at(cache_mtime, expiry) {
        Some(deadline) => now < deadline,
        // Expiry beyond the representable range never elapses.
        None => true,
    }
}

fn expires_at(cache_mtime: DateTime<Utc>, expiry: Duration) -> Option<DateTime<Utc>> {
    let expiry = TimeDelta::from_std(expiry).ok()?;
    cache_mtime.checked_add_signed(expiry)
}

/// Modification time of `path`, truncated to seconds.
///
/// Returns `None` when the file is missing or its mtime is unavailable or sits
/// at the Unix epoch.
pub fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    truncate_to_seconds(modified)
}

/// The current time at the resolution used for freshness decisions.
pub fn now() -> DateTime<Utc> {
    truncate_to_seconds(SystemTime::now()).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn truncate_to_seconds(at: SystemTime) -> Option<DateTime<Utc>> {
    let seconds = at.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_secs();
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0)
}
