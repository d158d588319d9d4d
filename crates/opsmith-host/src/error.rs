//! Error types for opsmith-host

use thiserror::Error;

use opsmith_exec::error::ExecError;

/// Errors from host facade operations
#[derive(Error, Debug)]
pub enum HostError {
    /// The user already exists (useradd precondition)
    #[error("user already exists: {0}")]
    UserExists(String),

    /// The user does not exist (userdel precondition)
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// Verified copy failed in transit or at verification
    #[error("copy failed: {reason}")]
    CopyFailed {
        /// What went wrong
        reason: String,
        /// Underlying transport error, when one exists. Absent for a
        /// pure integrity failure (hash mismatch).
        #[source]
        cause: Option<ExecError>,
    },

    /// No classification probe matched
    #[error("unknown system")]
    UnknownSystem,

    /// Password hashing failed
    #[error("password hashing failed")]
    PasswordHash,

    /// Error from the execution layer
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl HostError {
    /// Copy failure with an underlying transport error attached
    pub(crate) fn copy_failed(reason: impl Into<String>, cause: ExecError) -> Self {
        HostError::CopyFailed {
            reason: reason.into(),
            cause: Some(cause),
        }
    }

    /// Copy failure with no underlying cause (integrity mismatch)
    pub(crate) fn copy_rejected(reason: impl Into<String>) -> Self {
        HostError::CopyFailed {
            reason: reason.into(),
            cause: None,
        }
    }
}
