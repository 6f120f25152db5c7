use thiserror::Error;

/// Error kinds surfaced by public contracts.
///
/// The parser only produces `Format` at the frame level; field-level problems
/// degrade the packet type instead of failing the line. Pipeline plumbing
/// wraps unexpected failures as `Internal`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("unparseable frame: {0}")]
    Format(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
