//! Server error types.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Fatal server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: io::Error,
    },

    /// Ctrl-C handler could not be installed
    #[error("signal handler failed: {0}")]
    Signal(io::Error),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(io::Error),
}
