//! Atomic persistence of rendered pages.
//!
//! Content is staged in a temporary file next to its destination and renamed
//! into place, so a reader sees either the previous file or the complete new
//! one. Data is synced to disk before the rename. A staged file abandoned mid-write is removed when dropped and never
//! appears at the final path.

use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::error::CacheError;

const STAGING_PREFIX: &str = ".pagegate-";
const STAGING_SUFFIX: &str = ".tmp";

/// Persist `content` at `cache_path`, creating parent directories.
///
/// Concurrent writers to the same path never interleave: the last rename wins
/// and the other write is discarded whole.
pub fn persist_page(cache_path: &Path, content: &[u8]) -> Result<(), CacheError> {
    let directory = parent_dir(cache_path);
    fs::create_dir_all(&directory).map_err(|err| CacheError::write(cache_path, err))?;

    let mut staged = stage_in(&directory).map_err(|err| CacheError::write(cache_path, err))?;
    staged
        .write_all(content)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|err| CacheError::write(cache_path, err))?;

    staged
        .persist(cache_path)
        .map_err(|err| CacheError::write(cache_path, err.error))?;

    debug!(
        target = "pagegate::cache::writer",
        op = "persist_page",
        result = "ok",
        cache_path = %cache_path.display(),
        bytes = content.len(),
        "Cache file written"
    );
    Ok(())
}

/// Create `cache_root` if needed and prove it accepts writes.
///
/// Run once at startup so an unusable cache directory is reported to the
/// operator instead of silently degrading every request.
pub fn ensure_writable(cache_root: &Path) -> Result<(), CacheError> {
    fs::create_dir_all(cache_root).map_err(|err| CacheError::write(cache_root, err))?;
    let probe = stage_in(cache_root).map_err(|err| CacheError::write(cache_root, err))?;
    probe
        .close()
        .map_err(|err| CacheError::write(cache_root, err))
}

fn stage_in(directory: &Path) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(directory)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
    };

    use tempfile::TempDir;

    use super::*;

    const PAYLOAD_LEN: usize = 256 * 1024;

    #[test]
    fn creates_intermediate_directories() {
        let dir = TempDir::new().expect("temp dir");
        let cache_path = dir.path().join("a/b/c/page.html");

        persist_page(&cache_path, b"<h1>hi</h1>").expect("persisted");

        assert_eq!(fs::read(&cache_path).expect("read"), b"<h1>hi</h1>");
    }

    #[test]
    fn overwrites_existing_entry() {
        let dir = TempDir::new().expect("temp dir");
        let cache_path = dir.path().join("page.html");

        persist_page(&cache_path, b"old").expect("first write");
        persist_page(&cache_path, b"new").expect("second write");

        assert_eq!(fs::read(&cache_path).expect("read"), b"new");
    }

    #[test]
    fn leaves_no_staging_files_behind() {
        let dir = TempDir::new().expect("temp dir");
        persist_page(&dir.path().join("page.html"), b"body").expect("persisted");

        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("page.html")]);
    }

    #[test]
    fn concurrent_writers_never_interleave() {
        let dir = TempDir::new().expect("temp dir");
        let cache_path = Arc::new(dir.path().join("race/page.html"));
        let first = vec![b'a'; PAYLOAD_LEN];
        let second = vec![b'b'; PAYLOAD_LEN];
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let cache_path = Arc::clone(&cache_path);
            let done = Arc::clone(&done);
            let (first, second) = (first.clone(), second.clone());
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    if let Ok(bytes) = fs::read(cache_path.as_ref()) {
                        assert!(
                            bytes == first || bytes == second,
                            "reader observed a partial or interleaved file ({} bytes)",
                            bytes.len()
                        );
                    }
                }
            })
        };

        let writers: Vec<_> = [first.clone(), second.clone()]
            .into_iter()
            .map(|payload| {
                let cache_path = Arc::clone(&cache_path);
                thread::spawn(move || {
                    for _ in 0..20 {
                        persist_page(&cache_path, &payload).expect("persisted");
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().expect("writer thread");
        }
        done.store(true, Ordering::Release);
        reader.join().expect("reader thread");

        let final_bytes = fs::read(cache_path.as_ref()).expect("read final");
        assert!(final_bytes == first || final_bytes == second);
    }

    #[test]
    fn ensure_writable_creates_cache_root() {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().join("cache");

        ensure_writable(&root).expect("writable");

        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).expect("list").count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn write_failure_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").expect("write blocker");

        let err = persist_page(&blocker.join("page.html"), b"body").expect_err("parent is a file");
        assert!(matches!(err, CacheError::Write { .. }));
    }
}
