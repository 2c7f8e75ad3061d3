//! Connection shared secret.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Byte length of a shared secret: the width of the 2048-bit modulus.
pub const SECRET_LEN: usize = 256;

/// The 256-byte Diffie-Hellman shared value ("auth key").
///
/// Wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SECRET_LEN]);

impl SharedSecret {
    /// Wrap raw secret bytes
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Key-derivation slice for the AES key: `secret[0..32]`
    pub(crate) fn key_half(&self) -> &[u8] {
        &self.0[0..32]
    }

    /// Key-derivation slice for the IV: `secret[32..64]`
    pub(crate) fn iv_half(&self) -> &[u8] {
        &self.0[32..64]
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak() {
        let secret = SharedSecret::from_bytes([0xab; SECRET_LEN]);
        assert_eq!(format!("{secret:?}"), "SharedSecret(..)");
    }
}
