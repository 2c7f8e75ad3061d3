//! Per-connection key agreement and the symmetric envelope.
//!
//! Each connection runs one finite-field Diffie-Hellman exchange over the
//! RFC 3526 2048-bit MODP group (generator 2). The raw shared value,
//! big-endian and left-padded to 256 bytes, is the connection's
//! [`SharedSecret`].
//!
//! Every frame after the handshake is sealed with [`envelope::seal`]:
//!
//! ```text
//! padded  = PKCS#7(plaintext, 16)
//! msg_key = SHA-256(padded)[8..24]
//! key     = SHA-256(msg_key || secret[0..32])
//! iv      = SHA-256(secret[32..64] || msg_key)[0..16]
//! wire    = msg_key || AES-256-CBC(key, iv, padded)
//! ```
//!
//! # Security
//!
//! The layout above has no keyed MAC. [`envelope::open`] recomputes `msg_key`
//! from the decrypted plaintext and rejects a mismatch, which detects
//! corruption and blind tampering but is not an authenticator in the MAC
//! sense. Both directions share the same key schedule.

pub mod dh;
pub mod envelope;
pub mod error;
pub mod secret;

pub use dh::{KeyPair, PublicKey};
pub use envelope::{MSG_KEY_LEN, open, seal};
pub use error::{CryptoError, EnvelopeError};
pub use secret::{SECRET_LEN, SharedSecret};
