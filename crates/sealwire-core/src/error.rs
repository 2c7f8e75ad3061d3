//! Error types for the session core.

use sealwire_crypto::{CryptoError, EnvelopeError};
use sealwire_proto::{ProtocolError, error_document};
use serde_json::Value;
use thiserror::Error;

use crate::connection::ConnectionState;

/// State machine misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Operation not valid in the current state
    #[error("invalid state {state:?} for operation {operation}")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Why a connection's dispatcher stopped or dropped a frame.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// First frame missing, malformed or of the wrong type
    #[error("handshake violation: {0}")]
    HandshakeViolation(String),

    /// Client hello carried an unusable public value
    #[error("key exchange failed: {0}")]
    KeyExchange(#[from] CryptoError),

    /// Frame wrapper or hex did not parse
    #[error("bad frame: {0}")]
    Frame(#[from] ProtocolError),

    /// Envelope failed to open
    #[error("envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Peer went away
    #[error("peer disconnected")]
    Disconnected,

    /// A frame arrived before the handshake finished
    #[error("session has no shared secret")]
    NoSecret,

    /// Underlying transport failed
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// State machine misuse
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Failure reported by the business layer for one request.
///
/// Never fatal to the connection; rendered into an encrypted error response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Request requires a bound identity
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Session already has a bound identity
    #[error("Already authenticated")]
    AlreadyBound,

    /// No handler for the method name
    #[error("Unknown method")]
    UnknownMethod(String),

    /// Arguments missing or malformed
    #[error("{0}")]
    InvalidArgs(String),

    /// Request understood but refused
    #[error("{0}")]
    Rejected(String),

    /// Unexpected failure inside the business layer
    #[error("Internal error")]
    Internal(String),
}

impl ServiceError {
    /// Error-shaped response document for the client
    pub fn to_document(&self) -> Value {
        error_document(&self.to_string())
    }
}
