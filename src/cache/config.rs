//! Page cache configuration.
//!
//! Resolved from the `[cache]` and `[site]` sections of `pagegate.toml`.

use std::{path::PathBuf, time::Duration};

/// One week, the default lifetime of a cache entry.
pub const DEFAULT_CACHE_EXPIRE_SECS: u64 = 604_800;
pub const DEFAULT_CONTENT_EXT: &str = ".md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCacheConfig {
    /// Absolute cache root; `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Lifetime of a cache entry counted from its mtime.
    pub expire: Duration,
    /// Absolute content root the cache tree mirrors.
    pub content_dir: PathBuf,
    pub content_ext: String,
}

impl PageCacheConfig {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: None,
            expire: Duration::from_secs(DEFAULT_CACHE_EXPIRE_SECS),
            content_dir: content_dir.into(),
            content_ext: DEFAULT_CONTENT_EXT.to_string(),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.cache_dir.is_some()
    }
}

impl From<&crate::config::Settings> for PageCacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            cache_dir: settings.cache.cache_dir.clone(),
            expire: settings.cache.cache_expire,
            content_dir: settings.site.content_dir.clone(),
            content_ext: settings.site.content_ext.clone(),
        }
    }
}
