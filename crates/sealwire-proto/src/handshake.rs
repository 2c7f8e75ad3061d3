//! Plaintext handshake messages.
//!
//! Public values travel as decimal strings because the 2048-bit integers do
//! not fit any JSON number type.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Handshake message, tagged by `type` with the body under `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Handshake {
    /// Client -> server, first frame on every connection
    ClientHello(ClientHello),
    /// Server -> client, reply to a valid `client_hello`
    ServerHello(ServerHello),
}

/// Client's Diffie-Hellman public value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    /// Decimal string of `g^a mod p`
    pub public_key: String,
}

/// Server's Diffie-Hellman public value and the id of the new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    /// Decimal string of `g^b mod p`
    pub public_key: String,
    /// Opaque session identifier
    pub session_id: String,
}

impl Handshake {
    /// Parse a handshake message from a text frame
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
