//! Source document → cache file mapping.
//!
//! The cache tree mirrors the content tree: `content/a/b.md` is cached at
//! `cache/a/b.html`. The mapping is a pure function of the three configured
//! parts, so it needs no index and cannot collide.

use std::path::{Path, PathBuf};

use super::error::CacheError;

/// Extension of every cache file.
pub const CACHE_FILE_EXT: &str = ".html";

/// Map `source_path` to its cache file.
///
/// `source_path` must lie under `content_root` (compared component-wise) and
/// end with `content_ext`. Both are stripped, leaving the document id, which
/// is re-rooted under `cache_root` with [`CACHE_FILE_EXT`] appended.
pub fn map_cache_path(
    source_path: &Path,
    content_root: &Path,
    content_ext: &str,
    cache_root: &Path,
) -> Result<PathBuf, CacheError> {
    let relative = source_path
        .strip_prefix(content_root)
        .map_err(|_| CacheError::invalid_path(source_path, "source is outside the content root"))?;
    let relative = relative
        .to_str()
        .ok_or_else(|| CacheError::invalid_path(source_path, "source path is not valid UTF-8"))?;
    let document_id = relative.strip_suffix(content_ext).ok_or_else(|| {
        CacheError::invalid_path(source_path, "source does not carry the content extension")
    })?;
    if document_id.is_empty() {
        return Err(CacheError::invalid_path(
            source_path,
            "source has an empty document id",
        ));
    }

    let mut file_name = String::with_capacity(document_id.len() + CACHE_FILE_EXT.len());
    file_name.push_str(document_id);
    file_name.push_str(CACHE_FILE_EXT);
    Ok(cache_root.join(file_name))
}

/// Validated mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    content_root: PathBuf,
    content_ext: String,
    cache_root: PathBuf,
}

impl PathMapper {
    /// Validate the mapping parts once so per-request mapping can only fail
    /// for sources that genuinely sit outside the content tree.
    pub fn new(
        content_root: impl Into<PathBuf>,
        content_ext: impl Into<String>,
        cache_root: impl Into<PathBuf>,
    ) -> Result<Self, CacheError> {
        let content_root = content_root.into();
        let content_ext = content_ext.into();
        let cache_root = cache_root.into();

        if !content_root.is_absolute() {
            return Err(CacheError::invalid_path(
                &content_root,
                "content root must be absolute",
            ));
        }
        if !cache_root.is_absolute() {
            return Err(CacheError::invalid_path(
                &cache_root,
                "cache root must be absolute",
            ));
        }
        if content_ext.len() < 2 || !content_ext.starts_with('.') {
            return Err(CacheError::invalid_path(
                Path::new(&content_ext),
                "content extension must start with `.` and name an extension",
            ));
        }

        Ok(Self {
            content_root,
            content_ext,
            cache_root,
        })
    }

    pub fn map(&self, source_path: &Path) -> Result<PathBuf, CacheError> {
        map_cache_path(
            source_path,
            &self.content_root,
            &self.content_ext,
            &self.cache_root,
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn mapper() -> PathMapper {
        PathMapper::new("/srv/content", ".md", "/var/cache/pages").expect("valid mapper")
    }

    #[test]
    fn maps_nested_document_into_cache_tree() {
        let path = mapper()
            .map(Path::new("/srv/content/guides/setup.md"))
            .expect("mapped");
        assert_eq!(path, Path::new("/var/cache/pages/guides/setup.html"));
    }

    #[test]
    fn mapping_is_deterministic() {
        let mapper = mapper();
        let source = Path::new("/srv/content/index.md");
        assert_eq!(
            mapper.map(source).expect("first"),
            mapper.map(source).expect("second")
        );
    }

    #[test]
    fn distinct_sources_map_to_distinct_cache_files() {
        let mapper = mapper();
        let sources = [
            "/srv/content/index.md",
            "/srv/content/a.md",
            "/srv/content/a/index.md",
            "/srv/content/a/b.md",
            "/srv/content/a.b.md",
            "/srv/content/ab.md",
        ];

        let mapped: HashSet<PathBuf> = sources
            .iter()
            .map(|source| mapper.map(Path::new(source)).expect("mapped"))
            .collect();
        assert_eq!(mapped.len(), sources.len());
    }

    #[test]
    fn rejects_source_outside_content_root() {
        let err = mapper()
            .map(Path::new("/srv/other/page.md"))
            .expect_err("outside root");
        assert!(matches!(err, CacheError::InvalidPath { .. }));
    }

    #[test]
    fn root_prefix_is_matched_per_component() {
        let err = mapper()
            .map(Path::new("/srv/content2/page.md"))
            .expect_err("sibling directory is not under the root");
        assert!(matches!(err, CacheError::InvalidPath { .. }));
    }

    #[test]
    fn rejects_source_with_other_extension() {
        let err = mapper()
            .map(Path::new("/srv/content/page.txt"))
            .expect_err("wrong extension");
        assert!(matches!(err, CacheError::InvalidPath { .. }));
    }

    #[test]
    fn free_function_matches_mapper() {
        let path = map_cache_path(
            Path::new("/srv/content/page.md"),
            Path::new("/srv/content"),
            ".md",
            Path::new("/tmp/cache"),
        )
        .expect("mapped");
        assert_eq!(path, Path::new("/tmp/cache/page.html"));
    }

    #[test]
    fn mapper_rejects_relative_roots_and_bad_extension() {
        assert!(PathMapper::new("content", ".md", "/tmp/cache").is_err());
        assert!(PathMapper::new("/srv/content", ".md", "cache").is_err());
        assert!(PathMapper::new("/srv/content", "md", "/tmp/cache").is_err());
        assert!(PathMapper::new("/srv/content", ".", "/tmp/cache").is_err());
    }
}
