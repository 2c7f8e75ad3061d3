//! Inbound text frames must never panic, whatever the peer sends.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealwire_proto::{DEFAULT_MAX_FRAME_LEN, EncryptedFrame, Request};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };

    if let Ok(frame) = EncryptedFrame::decode(text, DEFAULT_MAX_FRAME_LEN) {
        let _ = frame.envelope();
    }
    let _ = Request::from_plaintext(data);
});
