use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use pagegate::{
    application::render::{MarkdownPipeline, RenderError, RenderPipeline, SourceDocument},
    cache::{
        CacheGate, CacheHooks, HookVerdict, PageCacheConfig, PageRequest, PageResponse,
        conditional::format_http_date, freshness::modified_at,
    },
};
use tempfile::TempDir;

/// Wraps the Markdown pipeline and counts how often it renders.
struct CountingPipeline {
    inner: MarkdownPipeline,
    renders: AtomicUsize,
}

impl CountingPipeline {
    fn new(content: &Path) -> Self {
        Self {
            inner: MarkdownPipeline::new(content, ".md", "Docs"),
            renders: AtomicUsize::new(0),
        }
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl RenderPipeline for CountingPipeline {
    fn resolve(&self, request_path: &str) -> Result<SourceDocument, RenderError> {
        self.inner.resolve(request_path)
    }

    fn render(&self, source: &SourceDocument) -> Result<Bytes, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.inner.render(source)
    }
}

struct Site {
    _dir: TempDir,
    content: PathBuf,
    cache: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let content = dir.path().join("content");
        let cache = dir.path().join("cache");
        fs::create_dir_all(content.join("guides")).expect("content dir");
        Self {
            _dir: dir,
            content,
            cache,
        }
    }

    fn gate(&self) -> CacheGate {
        CacheGate::new(&PageCacheConfig::new(&self.content).with_cache_dir(&self.cache))
            .expect("gate")
    }

    fn write_source(&self, relative: &str, markdown: &str, mtime: u64) -> PathBuf {
        let path = self.content.join(relative);
        fs::write(&path, markdown).expect("write source");
        set_mtime(&path, mtime);
        path
    }
}

fn set_mtime(path: &Path, seconds: u64) {
    let file = File::options().write(true).open(path).expect("open");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds))
        .expect("set mtime");
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).expect("valid timestamp")
}

#[test]
fn first_request_renders_and_persists_then_cache_serves() {
    let site = Site::new();
    site.write_source("page.md", "# Page\n\nHello.", 1_000);
    let pipeline = CountingPipeline::new(&site.content);
    let gate = site.gate();
    let request = PageRequest::new("/page");

    let first = gate.handle(&pipeline, &request).expect("first request");
    let rendered = match first {
        PageResponse::Rendered { body } => body,
        other => panic!("expected a render, got {other:?}"),
    };
    assert_eq!(pipeline.renders(), 1);

    let cache_path = site.cache.join("page.html");
    assert_eq!(fs::read(&cache_path).expect("cache file"), rendered.to_vec());
    let cache_mtime = modified_at(&cache_path).expect("cache mtime");
    assert!(cache_mtime > at(1_000));

    let second = gate.handle(&pipeline, &request).expect("second request");
    match second {
        PageResponse::Cached(page) => {
            assert_eq!(page.body, rendered);
            assert_eq!(page.last_modified, format_http_date(cache_mtime));
        }
        other => panic!("expected a cache hit, got {other:?}"),
    }
    assert_eq!(pipeline.renders(), 1);
}

#[test]
fn touching_the_source_invalidates_the_entry() {
    let site = Site::new();
    site.write_source("guides/setup.md", "# Setup", 2_000);
    let cache_path = site.cache.join("guides/setup.html");
    fs::create_dir_all(cache_path.parent().expect("parent")).expect("cache dir");
    fs::write(&cache_path, "<p>old</p>").expect("cache file");
    set_mtime(&cache_path, 1_500);
    let pipeline = CountingPipeline::new(&site.content);
    let gate = site.gate();

    let response = gate
        .handle_at(&pipeline, &PageRequest::new("/guides/setup"), at(2_100))
        .expect("rendered");

    assert!(matches!(response, PageResponse::Rendered { .. }));
    assert_eq!(pipeline.renders(), 1);
    let stored = fs::read_to_string(&cache_path).expect("rewritten");
    assert!(stored.contains("<h1>Setup</h1>"));
}

#[test]
fn conditional_request_against_fresh_entry_is_not_modified() {
    let site = Site::new();
    site.write_source("page.md", "# Page", 1_000);
    let pipeline = CountingPipeline::new(&site.content);
    let gate = site.gate();

    gate.handle(&pipeline, &PageRequest::new("/page"))
        .expect("warm");
    let cache_mtime = modified_at(&site.cache.join("page.html")).expect("cache mtime");

    let request = PageRequest::new("/page").with_if_modified_since(format_http_date(cache_mtime));
    let response = gate.handle(&pipeline, &request).expect("conditional");

    assert_eq!(
        response,
        PageResponse::NotModified {
            last_modified: format_http_date(cache_mtime)
        }
    );
    assert_eq!(pipeline.renders(), 1);
}

#[test]
fn directory_index_is_cached_under_its_own_name() {
    let site = Site::new();
    site.write_source("guides/index.md", "# Guides", 1_000);
    let pipeline = CountingPipeline::new(&site.content);
    let gate = site.gate();

    gate.handle(&pipeline, &PageRequest::new("/guides/"))
        .expect("rendered");

    assert!(site.cache.join("guides/index.html").is_file());
}

#[test]
fn missing_document_is_not_found_and_not_cached() {
    let site = Site::new();
    let pipeline = CountingPipeline::new(&site.content);
    let gate = site.gate();

    let err = gate
        .handle(&pipeline, &PageRequest::new("/ghost"))
        .expect_err("no document");

    assert!(err.is_not_found());
    assert!(!site.cache.join("ghost.html").exists());
}

#[test]
fn hooks_can_veto_and_transform() {
    let site = Site::new();
    site.write_source("page.md", "# Page", 1_000);
    site.write_source("draft.md", "# Draft", 1_000);
    let pipeline = CountingPipeline::new(&site.content);

    let mut hooks = CacheHooks::new();
    hooks
        .on_before_serve(|ctx| {
            if ctx.source_path.ends_with("draft.md") {
                HookVerdict::Bypass
            } else {
                HookVerdict::Continue
            }
        })
        .on_after_load(|ctx| ctx.body.extend_from_slice(b"\n<!-- served from cache -->"));
    let gate = site.gate().with_hooks(hooks);

    for path in ["/page", "/draft"] {
        gate.handle(&pipeline, &PageRequest::new(path))
            .expect("warm");
    }
    assert_eq!(pipeline.renders(), 2);

    match gate.handle(&pipeline, &PageRequest::new("/page")).expect("hit") {
        PageResponse::Cached(page) => {
            assert!(page.body.ends_with(b"<!-- served from cache -->"));
        }
        other => panic!("expected a cache hit, got {other:?}"),
    }
    assert_eq!(pipeline.renders(), 2);

    let draft = gate
        .handle(&pipeline, &PageRequest::new("/draft"))
        .expect("vetoed");
    assert!(matches!(draft, PageResponse::Rendered { .. }));
    assert_eq!(pipeline.renders(), 3);
}

#[test]
fn entry_deleted_after_freshness_check_is_rendered_and_rewritten() {
    let site = Site::new();
    site.write_source("page.md", "# Page", 1_000);
    let pipeline = CountingPipeline::new(&site.content);
    site.gate()
        .handle(&pipeline, &PageRequest::new("/page"))
        .expect("first render");
    let cache_file = site.cache.join("page.html");
    assert!(cache_file.is_file());

    // Removing the entry between the freshness check and the read forces the
    // read-error path deterministically.
    let mut hooks = CacheHooks::new();
    hooks.on_before_serve(|ctx| {
        fs::remove_file(ctx.cache_path).expect("remove cache entry");
        HookVerdict::Continue
    });
    let gate = site.gate().with_hooks(hooks);
    let counting = CountingPipeline::new(&site.content);

    let response = gate
        .handle(&counting, &PageRequest::new("/page"))
        .expect("rendered after read failure");

    match response {
        PageResponse::Rendered { body } => {
            assert!(String::from_utf8_lossy(&body).contains("<h1>Page</h1>"));
        }
        other => panic!("expected a fresh render, got {other:?}"),
    }
    assert_eq!(counting.renders(), 1);
    assert!(cache_file.is_file());
}
