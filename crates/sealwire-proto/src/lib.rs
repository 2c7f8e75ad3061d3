//! Wire format for the sealwire session transport.
//!
//! Every message is a JSON text frame on a persistent bidirectional
//! connection. The first exchange is a plaintext Diffie-Hellman handshake
//! (`client_hello` / `server_hello`); everything after it travels as
//! `{"data": "<hex>"}` where the hex string is an encrypted envelope.
//!
//! This crate only knows the shapes. It never touches key material; sealing
//! and opening envelopes lives in `sealwire-crypto`.
//!
//! # Security
//!
//! Inbound frames are bounded by a caller-supplied size limit before any JSON
//! or hex decoding happens, so an oversized frame costs one length check.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod close;
pub mod document;
pub mod errors;
pub mod frame;
pub mod handshake;

pub use close::CloseCode;
pub use document::{Request, error_document};
pub use errors::{ProtocolError, Result};
pub use frame::{DEFAULT_MAX_FRAME_LEN, EncryptedFrame};
pub use handshake::{ClientHello, Handshake, ServerHello};
