pub mod config;
pub mod download;
pub mod error;
pub mod humanize;
pub mod manager;
pub mod observability;
pub mod pipeline;

pub use error::{ContentError, Result};
pub use manager::{CacheKey, ContentManager};
