use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

/// A request path resolved to the file that backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Absolute path under the content root.
    pub path: PathBuf,
    /// Whether the file existed when the request was resolved.
    pub exists: bool,
}

impl SourceDocument {
    /// Probe `path` on disk.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let exists = path.is_file();
        Self { path, exists }
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
        }
    }
}

/// Structured errors surfaced by the rendering pipeline.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("no document found for `{path}`")]
    NotFound { path: String },
    #[error("failed to read source `{path}`: {message}")]
    Read { path: PathBuf, message: String },
    #[error("template rendering failed: {message}")]
    Template { message: String },
}

impl RenderError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn read(path: &Path, error: &std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Trait exposed by the rendering pipeline. Implementations must be
/// deterministic: the same source bytes produce the same output bytes.
pub trait RenderPipeline: Send + Sync {
    /// Map a request path to its source document. Fails only for paths that
    /// can never name a document.
    fn resolve(&self, request_path: &str) -> Result<SourceDocument, RenderError>;

    /// Render `source` to a complete response body.
    fn render(&self, source: &SourceDocument) -> Result<Bytes, RenderError>;
}
