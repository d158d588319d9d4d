//! Error types for opsmith-exec

use thiserror::Error;

/// Errors that can occur while executing commands
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// The executable could not be resolved
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A command that was required to succeed exited nonzero
    #[error("command failed: {exit_code} - {stderr}")]
    CommandFailed {
        /// Exit status code
        exit_code: i32,
        /// Captured stderr
        stderr: String,
    },

    /// Failed to connect to the remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication on the remote session failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    KeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution or transfer
    #[error("I/O error: {0}")]
    Io(String),

    /// Session not established
    #[error("not connected")]
    NotConnected,
}
