//! Error taxonomy for the catalog engine.
//!
//! Structural problems with an upload (`BadInput`) and misses on
//! tenant-scoped lookups (`NotFound`) are typed so callers can map them to
//! 400/404-style responses. Everything else (store failures, decode bugs)
//! propagates as `Internal` and is reported as a generic server-side error;
//! internal detail is logged, not returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The upload is structurally unusable: unrecognized file kind, missing
    /// header row, zero columns. Rejected before any persistence.
    #[error("bad input: {0}")]
    BadInput(String),

    /// No non-deleted document with this id exists for the calling tenant.
    #[error("document not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    pub fn bad_input(msg: impl Into<String>) -> Self {
        CatalogError::BadInput(msg.into())
    }
}
