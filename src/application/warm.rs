//! Bulk pre-rendering of the content tree into the page cache.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::stream::{self, TryStreamExt};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    application::render::{RenderPipeline, SourceDocument},
    cache::{CacheGate, freshness},
};

const SOURCE: &str = "pagegate::application::warm";
const MAX_CONCURRENCY: usize = 32;

#[derive(Debug, Error)]
pub enum WarmError {
    #[error("page cache is disabled; set `cache.cache_dir` to warm it")]
    Disabled,
    #[error("failed to scan content directory `{path}`: {message}")]
    Scan { path: PathBuf, message: String },
    #[error("warm task aborted: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy)]
pub struct WarmOptions {
    /// Maximum number of documents rendered at once.
    pub concurrency: usize,
    /// Re-render documents whose cache entry is still fresh.
    pub force: bool,
}

impl Default for WarmOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub rendered: usize,
    pub fresh: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Tally {
    rendered: AtomicUsize,
    fresh: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn report(&self) -> WarmReport {
        WarmReport {
            rendered: self.rendered.load(Ordering::Relaxed),
            fresh: self.fresh.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Every file under `content_dir` whose name ends with `content_ext`, sorted.
pub fn discover_documents(content_dir: &Path, content_ext: &str) -> Result<Vec<PathBuf>, WarmError> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(content_dir).follow_links(true) {
        let entry = entry.map_err(|err| WarmError::Scan {
            path: content_dir.to_path_buf(),
            message: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_ext = entry
            .file_name()
            .to_str()
            .and_then(|name| name.strip_suffix(content_ext))
            .is_some_and(|stem| !stem.is_empty());
        if matches_ext {
            documents.push(entry.into_path());
        }
    }
    documents.sort();
    Ok(documents)
}

/// Render `documents` through `pipeline` and persist each result.
///
/// Individual render or write failures are counted and logged; only a
/// disabled cache or a crashed task fails the whole run.
pub async fn warm_cache<P>(
    gate: Arc<CacheGate>,
    pipeline: Arc<P>,
    documents: Vec<PathBuf>,
    options: WarmOptions,
) -> Result<WarmReport, WarmError>
where
    P: RenderPipeline + 'static,
{
    if !gate.is_enabled() {
        return Err(WarmError::Disabled);
    }

    let concurrency = options.concurrency.clamp(1, MAX_CONCURRENCY);
    let tally = Arc::new(Tally::default());
    let tally_handle = Arc::clone(&tally);

    info!(
        target = SOURCE,
        documents = documents.len(),
        concurrency,
        force = options.force,
        "Starting cache warm"
    );

    stream::iter(documents.into_iter().map(Ok::<_, WarmError>))
        .try_for_each_concurrent(Some(concurrency), move |path| {
            let gate = Arc::clone(&gate);
            let pipeline = Arc::clone(&pipeline);
            let tally = Arc::clone(&tally_handle);
            async move {
                tokio::task::spawn_blocking(move || {
                    warm_document(&gate, pipeline.as_ref(), path, options.force, &tally)
                })
                .await
                .map_err(|err| WarmError::Task(err.to_string()))
            }
        })
        .await?;

    let report = tally.report();
    info!(
        target = SOURCE,
        rendered = report.rendered,
        fresh = report.fresh,
        failed = report.failed,
        "Cache warm finished"
    );
    Ok(report)
}

fn warm_document<P>(gate: &CacheGate, pipeline: &P, path: PathBuf, force: bool, tally: &Tally)
where
    P: RenderPipeline + ?Sized,
{
    let source = SourceDocument::at(path);
    if !force && gate.is_fresh(&source, freshness::now()) {
        tally.fresh.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let Some(cache_path) = gate.cache_path(&source.path) else {
        tally.failed.fetch_add(1, Ordering::Relaxed);
        return;
    };

    match pipeline.render(&source) {
        Ok(body) if gate.store(&cache_path, &body) => {
            tally.rendered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(_) => {
            tally.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            warn!(
                target = SOURCE,
                op = "warm_document",
                result = "render_error",
                source_path = %source.path.display(),
                error = %err,
                "Failed to render document"
            );
            tally.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
