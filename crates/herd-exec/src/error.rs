//! Error types for herd-exec

use thiserror::Error;

/// Errors that can occur while working against one remote host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Every configured authentication method was rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Remote command finished with a non-zero status
    #[error("command exited with status {status}: {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// I/O error on the session or its channels
    #[error("I/O error: {0}")]
    IoError(String),
}
