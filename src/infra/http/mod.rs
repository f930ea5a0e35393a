mod middleware;
mod pages;

pub use pages::{HttpState, build_router};
