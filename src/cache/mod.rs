//! File-backed page cache.
//!
//! Every rendered page is persisted as an HTML file that mirrors its source
//! document under the cache root:
//!
//! ```text
//! content/guides/setup.md  ->  cache/guides/setup.html
//! ```
//!
//! An entry is served instead of rendering while it is strictly newer than
//! its source and younger than `cache_expire`. Nothing is ever deleted; an
//! entry is replaced the next time its page renders.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! cache_dir = "cache"      # unset or empty disables caching
//! cache_expire = 604800    # seconds
//! ```

mod config;
pub mod conditional;
mod error;
pub mod freshness;
mod gate;
mod hooks;
pub mod path;
mod writer;

pub use conditional::{CacheEntry, CachedPage, ServeOutcome};
pub use config::{DEFAULT_CACHE_EXPIRE_SECS, DEFAULT_CONTENT_EXT, PageCacheConfig};
pub use error::CacheError;
pub use gate::{CacheGate, Lookup, PageRequest, PageResponse};
pub use hooks::{AfterLoad, BeforeServe, CacheHooks, HookVerdict};
pub use path::{CACHE_FILE_EXT, PathMapper, map_cache_path};
pub use writer::{ensure_writable, persist_page};
