//! Observer lists for the two cache extension points.
//!
//! Hooks run synchronously, in registration order, on the request's thread.

use std::{fmt, path::Path};

use tracing::debug;

/// Context handed to `before_serve` hooks once an entry proved fresh.
#[derive(Debug, Clone, Copy)]
pub struct BeforeServe<'a> {
    pub source_path: &'a Path,
    pub cache_path: &'a Path,
}

/// Decision returned by a `before_serve` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    /// Keep serving from the cache.
    Continue,
    /// Ignore the cache entry and render instead.
    Bypass,
}

/// Mutable context handed to `after_load` hooks; hooks may rewrite `body`.
#[derive(Debug)]
pub struct AfterLoad<'a> {
    pub source_path: &'a Path,
    pub cache_path: &'a Path,
    pub body: Vec<u8>,
}

type BeforeServeHook = Box<dyn Fn(&BeforeServe<'_>) -> HookVerdict + Send + Sync>;
type AfterLoadHook = Box<dyn Fn(&mut AfterLoad<'_>) + Send + Sync>;

#[derive(Default)]
pub struct CacheHooks {
    before_serve: Vec<BeforeServeHook>,
    after_load: Vec<AfterLoadHook>,
}

impl CacheHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook that may veto serving a fresh entry.
    pub fn on_before_serve<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&BeforeServe<'_>) -> HookVerdict + Send + Sync + 'static,
    {
        self.before_serve.push(Box::new(hook));
        self
    }

    /// Register a hook that may transform cached bytes before they are served.
    pub fn on_after_load<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut AfterLoad<'_>) + Send + Sync + 'static,
    {
        self.after_load.push(Box::new(hook));
        self
    }

    /// Run `before_serve` hooks; the first veto wins and later hooks are skipped.
    pub(crate) fn run_before_serve(&self, context: &BeforeServe<'_>) -> HookVerdict {
        for (index, hook) in self.before_serve.iter().enumerate() {
            if hook(context) == HookVerdict::Bypass {
                debug!(
                    target = "pagegate::cache::hooks",
                    op = "before_serve",
                    result = "bypass",
                    hook_index = index,
                    source_path = %context.source_path.display(),
                    "Cache hit vetoed by hook"
                );
                return HookVerdict::Bypass;
            }
        }
        HookVerdict::Continue
    }

    pub(crate) fn run_after_load(&self, context: &mut AfterLoad<'_>) {
        for hook in &self.after_load {
            hook(context);
        }
    }

    pub(crate) fn has_after_load(&self) -> bool {
        !self.after_load.is_empty()
    }
}

impl fmt::Debug for CacheHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHooks")
            .field("before_serve", &self.before_serve.len())
            .field("after_load", &self.after_load.len())
            .finish()
    }
}
