//! Application close codes.
//!
//! WebSocket reserves 4000-4999 for private use. The server closes with one of
//! these and no body.

/// Close code sent by the server when it terminates a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// First frame was missing, malformed, not a `client_hello`, carried an
    /// invalid public value, or did not arrive before the handshake timeout.
    HandshakeViolation = 4000,
    /// Too many consecutive frames failed to decode or decrypt.
    TooManyRejectedFrames = 4001,
    /// The session was pruned from the registry after a failed push.
    Evicted = 4002,
}

impl CloseCode {
    /// Numeric close code
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a numeric close code
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            4000 => Some(Self::HandshakeViolation),
            4001 => Some(Self::TooManyRejectedFrames),
            4002 => Some(Self::Evicted),
            _ => None,
        }
    }

    /// Short human-readable reason sent alongside the code
    pub fn reason(self) -> &'static str {
        match self {
            Self::HandshakeViolation => "handshake violation",
            Self::TooManyRejectedFrames => "too many rejected frames",
            Self::Evicted => "evicted",
        }
    }
}
