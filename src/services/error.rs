use std::time::Duration;
use thiserror::Error;

/// Typed error for the media core. `NotFound` is a distinguished value so
/// callers can branch into ingestion/generation instead of failing.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("identification failed: {0}")]
    Identification(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("timeout after {0:?}: {1}")]
    Timeout(Duration, String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MediaError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn storage(what: impl std::fmt::Display) -> Self {
        Self::Storage(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
