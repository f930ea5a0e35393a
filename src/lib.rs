//! pagegate: a Markdown site server with a transparent, file-backed page cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod presentation;
