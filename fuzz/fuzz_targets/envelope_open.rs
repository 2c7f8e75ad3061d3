//! Opening arbitrary envelope bytes fails cleanly and never yields a
//! plaintext that reseals to different bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealwire_crypto::{SECRET_LEN, SharedSecret, open, seal};

fuzz_target!(|data: &[u8]| {
    let secret = SharedSecret::from_bytes([0x5a; SECRET_LEN]);

    if let Ok(plaintext) = open(&secret, data) {
        assert_eq!(seal(&secret, &plaintext), data, "accepted a non-canonical envelope");
    }
});
