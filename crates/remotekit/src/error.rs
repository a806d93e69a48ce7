//! Error types for remote sessions.

use std::io;
use std::path::PathBuf;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the transport, as opposed to a command exiting non-zero.
///
/// A command that runs and exits with a failure status is not an error at
/// this layer; [`Session::run`](crate::Session::run) returns its status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session could not be established.
    #[error("failed to connect to {target}: {message}")]
    Connect { target: String, message: String },

    /// A local helper program could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Copying a file to the target failed.
    #[error("failed to transfer {} to {remote}: {message}", local.display())]
    Transfer {
        local: PathBuf,
        remote: String,
        message: String,
    },

    /// The session was used after [`close`](crate::Session::close).
    #[error("session is closed")]
    Closed,

    /// Other I/O failure while talking to a child process.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error came from the connection rather than a local problem.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Closed)
    }
}
