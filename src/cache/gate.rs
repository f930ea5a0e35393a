//! Request orchestration around the render pipeline.
//!
//! ```text
//! Disabled ──────────────────────────────────────────────► render
//! CheckingCache ── absent / stale / vetoed / read error ──► render ─► persist
//!       └── fresh ─► Serving ─┬─ If-Modified-Since current ─► 304
//!                             └─ otherwise ─────────────────► cached bytes
//! ```
//!
//! No cache failure ever fails a request that the pipeline could answer.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, warn};

use super::{
    conditional::{self, CacheEntry, CachedPage, ServeOutcome},
    config::PageCacheConfig,
    error::CacheError,
    freshness::{self, is_fresh, modified_at},
    hooks::{AfterLoad, BeforeServe, CacheHooks, HookVerdict},
    path::PathMapper,
    writer::persist_page,
};
use crate::application::render::{RenderError, RenderPipeline, SourceDocument};

const SOURCE: &str = "pagegate::cache::gate";

/// A page request as seen by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Request path, e.g. `/guides/setup`.
    pub path: String,
    /// Raw `If-Modified-Since` header value.
    pub if_modified_since: Option<String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            if_modified_since: None,
        }
    }

    pub fn with_if_modified_since(mut self, value: impl Into<String>) -> Self {
        self.if_modified_since = Some(value.into());
        self
    }
}

/// Final answer for a page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResponse {
    /// Terminate with 304 and no body; nothing was rendered or written.
    NotModified { last_modified: String },
    /// Served from the cache file; the pipeline did not run.
    Cached(CachedPage),
    /// Produced by the pipeline.
    Rendered { body: Bytes },
}

/// Result of consulting the cache before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No cache root is configured.
    Disabled,
    /// The document cannot be cached (its source does not exist).
    Uncacheable,
    /// Render, then persist at `cache_path`.
    Bypass { cache_path: PathBuf },
    NotModified { last_modified: String },
    Hit(CachedPage),
}

#[derive(Debug)]
pub struct CacheGate {
    mapper: Option<PathMapper>,
    expire: Duration,
    hooks: CacheHooks,
}

impl CacheGate {
    /// Build a gate from validated configuration.
    ///
    /// Fails with [`CacheError::InvalidPath`] when the mapping parts are
    /// unusable; this is a startup error, never a per-request one.
    pub fn new(config: &PageCacheConfig) -> Result<Self, CacheError> {
        let mapper = config
            .cache_dir
            .as_ref()
            .map(|cache_dir| {
                PathMapper::new(&config.content_dir, &config.content_ext, cache_dir)
            })
            .transpose()?;

        Ok(Self {
            mapper,
            expire: config.expire,
            hooks: CacheHooks::default(),
        })
    }

    /// A gate that always defers to the pipeline.
    pub fn disabled() -> Self {
        Self {
            mapper: None,
            expire: Duration::ZERO,
            hooks: CacheHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: CacheHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.mapper.is_some()
    }

    /// The cache file that backs `source_path`; it may not exist yet.
    pub fn cache_path(&self, source_path: &Path) -> Option<PathBuf> {
        let mapper = self.mapper.as_ref()?;
        match mapper.map(source_path) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    op = "cache_path",
                    result = "invalid_path",
                    error = %err,
                    "Source document cannot be mapped into the cache"
                );
                None
            }
        }
    }

    /// Answer `request`, rendering through `pipeline` only when the cache
    /// cannot.
    pub fn handle<P>(&self, pipeline: &P, request: &PageRequest) -> Result<PageResponse, RenderError>
    where
        P: RenderPipeline + ?Sized,
    {
        self.handle_at(pipeline, request, freshness::now())
    }

    /// [`CacheGate::handle`] with an explicit clock.
    pub fn handle_at<P>(
        &self,
        pipeline: &P,
        request: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<PageResponse, RenderError>
    where
        P: RenderPipeline + ?Sized,
    {
        let source = pipeline.resolve(&request.path)?;

        let cache_path = match self.lookup(&source, request.if_modified_since.as_deref(), now) {
            Lookup::NotModified { last_modified } => {
                return Ok(PageResponse::NotModified { last_modified });
            }
            Lookup::Hit(page) => return Ok(PageResponse::Cached(page)),
            Lookup::Bypass { cache_path } => Some(cache_path),
            Lookup::Disabled | Lookup::Uncacheable => None,
        };

        let body = pipeline.render(&source)?;
        if let Some(cache_path) = cache_path {
            self.store(&cache_path, &body);
        }
        Ok(PageResponse::Rendered { body })
    }

    /// Consult the cache for `source` without rendering anything.
    pub fn lookup(
        &self,
        source: &SourceDocument,
        if_modified_since: Option<&str>,
        now: DateTime<Utc>,
    ) -> Lookup {
        if self.mapper.is_none() {
            return Lookup::Disabled;
        }
        if !source.exists {
            return Lookup::Uncacheable;
        }
        let Some(cache_path) = self.cache_path(&source.path) else {
            return Lookup::Uncacheable;
        };

        let Some(entry) = self.fresh_entry(source, &cache_path, now) else {
            counter!("pagegate_cache_miss_total").increment(1);
            debug!(
                target = SOURCE,
                op = "lookup",
                result = "miss",
                cache_path = %cache_path.display(),
                "Cache entry absent or stale"
            );
            return Lookup::Bypass { cache_path };
        };

        let context = BeforeServe {
            source_path: &source.path,
            cache_path: &cache_path,
        };
        if self.hooks.run_before_serve(&context) == HookVerdict::Bypass {
            counter!("pagegate_cache_miss_total").increment(1);
            return Lookup::Bypass { cache_path };
        }

        match conditional::serve(&entry, if_modified_since) {
            Ok(ServeOutcome::NotModified { last_modified }) => {
                counter!("pagegate_cache_not_modified_total").increment(1);
                debug!(
                    target = SOURCE,
                    op = "lookup",
                    result = "not_modified",
                    cache_path = %cache_path.display(),
                    "Client copy is current"
                );
                Lookup::NotModified { last_modified }
            }
            Ok(ServeOutcome::Hit(page)) => {
                counter!("pagegate_cache_hit_total").increment(1);
                debug!(
                    target = SOURCE,
                    op = "lookup",
                    result = "hit",
                    cache_path = %cache_path.display(),
                    bytes = page.body.len(),
                    "Serving cached page"
                );
                Lookup::Hit(self.after_load(source, &cache_path, page))
            }
            Err(err) => {
                counter!("pagegate_cache_miss_total").increment(1);
                warn!(
                    target = SOURCE,
                    op = "lookup",
                    result = "read_error",
                    error = %err,
                    "Cache entry vanished; rendering instead"
                );
                Lookup::Bypass { cache_path }
            }
        }
    }

    /// Whether the cache entry for `source` is currently fresh.
    pub fn is_fresh(&self, source: &SourceDocument, now: DateTime<Utc>) -> bool {
        if !source.exists {
            return false;
        }
        self.cache_path(&source.path)
            .and_then(|cache_path| self.fresh_entry(source, &cache_path, now))
            .is_some()
    }

    /// Persist rendered output. Failures are logged and swallowed.
    pub fn store(&self, cache_path: &Path, body: &[u8]) -> bool {
        match persist_page(cache_path, body) {
            Ok(()) => true,
            Err(err) => {
                counter!("pagegate_cache_write_error_total").increment(1);
                warn!(
                    target = SOURCE,
                    op = "store",
                    result = "write_error",
                    error = %err,
                    "Failed to persist rendered page; continuing uncached"
                );
                false
            }
        }
    }

    fn fresh_entry(
        &self,
        source: &SourceDocument,
        cache_path: &Path,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry> {
        let cache_mtime = modified_at(cache_path);
        let source_mtime = modified_at(&source.path);
        if !is_fresh(cache_mtime, source_mtime, now, self.expire) {
            return None;
        }
        cache_mtime.map(|modified_at| CacheEntry {
            path: cache_path.to_path_buf(),
            modified_at,
        })
    }

    fn after_load(&self, source: &SourceDocument, cache_path: &Path, page: CachedPage) -> CachedPage {
        if !self.hooks.has_after_load() {
            return page;
        }

        let CachedPage {
            body,
            last_modified,
        } = page;
        let mut context = AfterLoad {
            source_path: &source.path,
            cache_path,
            body: Vec::from(body),
        };
        self.hooks.run_after_load(&mut context);

        CachedPage {
            body: Bytes::from(context.body),
            last_modified,
        }
    }
}
