//! Error taxonomy for the visibility pipeline (Section 7).
//!
//! `ConfigurationError` is raised at setup only. `ResourceError` and
//! `DeviceLost` bubble out of the frame driver. `RecordError` and
//! `QueryError` are caught at the call site and handled locally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("resource error: {0}")]
    ResourceError(String),

    #[error("record error: {0}")]
    RecordError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("device lost")]
    DeviceLost,
}

pub type CoreResult<T> = Result<T, CoreError>;
