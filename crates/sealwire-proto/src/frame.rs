//! Post-handshake frame: `{"data": "<hex-encoded envelope>"}`.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Default upper bound on an inbound text frame (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Encrypted frame as it appears on the wire.
///
/// The envelope bytes are carried hex-encoded; decoding to bytes is a separate
/// step so that a frame with a well-formed wrapper but garbage hex is reported
/// distinctly in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFrame {
    /// Hex-encoded envelope
    pub data: String,
}

impl EncryptedFrame {
    /// Wrap raw envelope bytes
    pub fn from_envelope(envelope: &[u8]) -> Self {
        Self { data: hex::encode(envelope) }
    }

    /// Parse a text frame, rejecting anything longer than `max_len` bytes
    /// before touching the JSON.
    pub fn decode(text: &str, max_len: usize) -> Result<Self> {
        if text.len() > max_len {
            return Err(ProtocolError::FrameTooLarge { size: text.len(), max: max_len });
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Decode the hex payload into envelope bytes
    pub fn envelope(&self) -> Result<Vec<u8>> {
        Ok(hex::decode(&self.data)?)
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let frame = EncryptedFrame::from_envelope(&[0xde, 0xad, 0xbe, 0xef]);
        insta::assert_snapshot!(frame.to_json().unwrap(), @r#"{"data":"deadbeef"}"#);
    }

    #[test]
    fn decode_and_unhex() {
        let frame = EncryptedFrame::decode(r#"{"data":"00ff"}"#, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(frame.envelope().unwrap(), vec![0x00, 0xff]);
    }

    #[test]
    fn missing_data_field_is_rejected() {
        let result = EncryptedFrame::decode(r#"{"payload":"00"}"#, DEFAULT_MAX_FRAME_LEN);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn bad_hex_is_rejected() {
        let frame = EncryptedFrame::decode(r#"{"data":"zz"}"#, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert!(matches!(frame.envelope(), Err(ProtocolError::Hex(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_parsing() {
        let text = format!(r#"{{"data":"{}"}}"#, "00".repeat(64));
        let result = EncryptedFrame::decode(&text, 32);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { max: 32, .. })));
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_text_never_panics(text in ".{0,256}") {
            if let Ok(frame) = EncryptedFrame::decode(&text, DEFAULT_MAX_FRAME_LEN) {
                let _ = frame.envelope();
            }
        }

        #[test]
        fn limit_is_inclusive(len in 0usize..64) {
            let text = "x".repeat(len);
            let rejected = matches!(
                EncryptedFrame::decode(&text, 32),
                Err(ProtocolError::FrameTooLarge { .. })
            );
            proptest::prop_assert_eq!(rejected, len > 32);
        }
    }
}
