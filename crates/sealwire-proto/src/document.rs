//! Decrypted documents.
//!
//! Client -> server plaintexts are requests: `{"method": "...", "args": {...}}`.
//! Server -> client plaintexts (responses and pushes) are opaque JSON objects
//! carrying a `type` field; the transport never inspects them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::{ProtocolError, Result};

/// Decrypted client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Method name, routed by the business layer
    pub method: String,
    /// Method arguments; an empty object when absent
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

impl Request {
    /// Build a request
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self { method: method.into(), args }
    }

    /// Parse a decrypted plaintext
    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(plaintext).map_err(|_| ProtocolError::NotUtf8)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to plaintext bytes
    pub fn to_plaintext(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Error-shaped response document: `{"type":"error","message":...}`.
pub fn error_document(message: &str) -> Value {
    json!({ "type": "error", "message": message })
}
