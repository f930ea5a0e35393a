//! Conditional serving of a fresh cache entry.

use std::{fs, path::PathBuf};

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::CacheError;

/// IMF-fixdate, the preferred HTTP date form (`Sun, 06 Nov 1994 08:49:37 GMT`).
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
/// Obsolete RFC 850 form (`Sunday, 06-Nov-94 08:49:37 GMT`).
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
/// ANSI C `asctime()` form (`Sun Nov  6 08:49:37 1994`).
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// A cache file known to exist at the time of the freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

/// Cached bytes ready to be returned in place of a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub body: Bytes,
    /// `Last-Modified` header value derived from the cache file mtime.
    pub last_modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The client copy is current: answer 304 with no body and stop.
    NotModified { last_modified: String },
    Hit(CachedPage),
}

/// Answer a request from `entry`, honouring `If-Modified-Since`.
///
/// Fails with [`CacheError::Read`] when the file disappeared after the
/// freshness check; callers fall back to rendering.
pub fn serve(
    entry: &CacheEntry,
    if_modified_since: Option<&str>,
) -> Result<ServeOutcome, CacheError> {
    let last_modified = format_http_date(entry.modified_at);

    if is_not_modified(entry.modified_at, if_modified_since) {
        return Ok(ServeOutcome::NotModified { last_modified });
    }

    let body = load(entry)?;
    Ok(ServeOutcome::Hit(CachedPage {
        body,
        last_modified,
    }))
}

/// True when the client's `If-Modified-Since` is at or after `modified_at`.
/// An unparseable header counts as absent.
pub fn is_not_modified(modified_at: DateTime<Utc>, if_modified_since: Option<&str>) -> bool {
    if_modified_since
        .and_then(parse_http_date)
        .is_some_and(|since| since.timestamp() >= modified_at.timestamp())
}

fn load(entry: &CacheEntry) -> Result<Bytes, CacheError> {
    fs::read(&entry.path)
        .map(Bytes::from)
        .map_err(|err| CacheError::read(&entry.path, err))
}

/// Format `at` as an RFC 1123 GMT date.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

/// Parse any of the three HTTP date forms.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    [IMF_FIXDATE, RFC_850, ASCTIME]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
