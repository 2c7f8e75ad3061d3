//! Handshake parsing plus public value validation on hostile input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealwire_crypto::PublicKey;
use sealwire_proto::Handshake;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };

    if let Ok(Handshake::ClientHello(hello)) = Handshake::from_json(text) {
        let _ = PublicKey::from_decimal(&hello.public_key);
    }
});
