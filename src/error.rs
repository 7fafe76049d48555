use std::sync::Arc;

use thiserror::Error;

use crate::download::DownloadError;
use crate::pipeline::{Stage, TypeTag};

/// Error returned by `ContentManager::load` and by loader handlers.
///
/// The type is `Clone` because every caller attached to a coalesced load
/// receives the same failure.
#[derive(Debug, Clone, Error)]
pub enum ContentError {
    #[error("{stage} handler not found for sourceType:'{source_type}' targetType:'{target_type}'")]
    HandlerNotFound {
        stage: Stage,
        source_type: TypeTag,
        target_type: TypeTag,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{stage} handler for '{target_type}' finished without producing a result: {source_ref}")]
    MissingResult {
        stage: Stage,
        target_type: TypeTag,
        source_ref: String,
    },

    #[error("asset '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Handler(String),

    #[error(transparent)]
    External(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("load task aborted: {0}")]
    Aborted(String),
}

impl ContentError {
    /// Wraps any error raised inside a handler.
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ContentError::External(Arc::new(err))
    }

    pub fn handler(message: impl Into<String>) -> Self {
        ContentError::Handler(message.into())
    }
}

impl From<serde_json::Error> for ContentError {
    fn from(value: serde_json::Error) -> Self {
        ContentError::external(value)
    }
}

pub type Result<T> = std::result::Result<T, ContentError>;
