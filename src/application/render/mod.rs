//! Rendering pipeline interface and the Markdown implementation.
//!
//! The pipeline is pure with respect to its inputs: it reads a source document
//! and produces deterministic HTML bytes. Caching happens in the caller.

mod pipeline;
mod types;

pub use pipeline::MarkdownPipeline;
pub use types::{RenderError, RenderPipeline, SourceDocument};
