use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Failures raised by the page cache.
///
/// Only [`CacheError::InvalidPath`] is fatal, and only when it surfaces while
/// validating configuration at startup. Read and write failures degrade the
/// current request to an uncached render.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("`{path}` cannot be mapped to a cache file: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },
    #[error("failed to read cache file `{path}`: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("failed to write cache file `{path}`: {error}")]
    Write {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
}

impl CacheError {
    pub(crate) fn invalid_path(path: &Path, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.to_path_buf(),
            reason,
        }
    }

    pub(crate) fn read(path: &Path, error: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            error,
        }
    }

    pub(crate) fn write(path: &Path, error: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            error,
        }
    }
}
