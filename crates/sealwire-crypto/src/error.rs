//! Error types for key exchange and envelope operations.

use thiserror::Error;

/// Key exchange failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Public value was not a decimal integer
    #[error("public value is not a decimal integer")]
    MalformedPublicValue,

    /// Public value outside `[2, p-2]`
    #[error("public value out of range")]
    PublicValueOutOfRange,

    /// Agreement produced a degenerate shared value
    #[error("degenerate shared secret")]
    WeakSharedSecret,
}

/// Envelope open failures.
///
/// The variants exist for logging; callers must treat them identically since a
/// wrong key and a corrupted frame are not distinguishable from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Fewer than 16 bytes, so no room for `msg_key`
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),

    /// Ciphertext is not a whole number of blocks
    #[error("ciphertext length {0} is not a multiple of the block size")]
    Misaligned(usize),

    /// PKCS#7 padding invalid after decryption
    #[error("invalid padding")]
    Padding,

    /// Recomputed `msg_key` does not match the transmitted one
    #[error("msg_key mismatch")]
    MsgKeyMismatch,
}
