//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds the configured size limit
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame in bytes
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Text was not valid JSON of the expected shape
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    /// `data` field was not valid hex
    #[error("malformed hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Decrypted payload was not UTF-8
    #[error("payload is not utf-8")]
    NotUtf8,
}
