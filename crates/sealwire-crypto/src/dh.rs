//! Finite-field Diffie-Hellman over the RFC 3526 2048-bit MODP group.

use std::{fmt, sync::LazyLock};

use num_bigint::BigUint;
use num_traits::One;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    secret::{SECRET_LEN, SharedSecret},
};

/// RFC 3526 group 14 safe prime.
const PRIME_HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
                         020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
                         4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
                         EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
                         98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
                         9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
                         E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
                         3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

/// Longest decimal rendering of a value below the modulus.
const MAX_DECIMAL_DIGITS: usize = 617;

#[allow(clippy::expect_used)]
static PRIME: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).expect("RFC 3526 prime is valid hex")
});

static GENERATOR: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(2u32));

/// The group modulus `p`.
pub fn prime() -> &'static BigUint {
    &PRIME
}

/// The group generator `g = 2`.
pub fn generator() -> &'static BigUint {
    &GENERATOR
}

/// A validated public value in `[2, p-2]`.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(BigUint);

impl PublicKey {
    /// Validate an integer as a peer public value.
    ///
    /// 0, 1, p-1 and anything at or above p confine the shared secret to a
    /// trivial subgroup and are rejected.
    pub fn from_biguint(value: BigUint) -> Result<Self, CryptoError> {
        let upper = prime() - 1u32;
        if value <= BigUint::one() || value >= upper {
            return Err(CryptoError::PublicValueOutOfRange);
        }
        Ok(Self(value))
    }

    /// Parse and validate the decimal wire form.
    pub fn from_decimal(text: &str) -> Result<Self, CryptoError> {
        if text.is_empty()
            || text.len() > MAX_DECIMAL_DIGITS
            || !text.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(CryptoError::MalformedPublicValue);
        }
        let value =
            BigUint::parse_bytes(text.as_bytes(), 10).ok_or(CryptoError::MalformedPublicValue)?;
        Self::from_biguint(value)
    }

    /// Decimal wire form
    pub fn to_decimal(&self) -> String {
        self.0.to_str_radix(10)
    }

    /// Underlying integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.0.bits())
    }
}

/// One side's private exponent and public value.
///
/// Generated fresh for every connection.
#[derive(Clone)]
pub struct KeyPair {
    private: BigUint,
    public: BigUint,
}

impl KeyPair {
    /// Sample a private exponent uniformly from `[0, p-2]`.
    ///
    /// Uses rejection sampling on 256 random bytes; with `p` this close to
    /// 2^2048 a retry is practically never needed.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let bound = prime() - 1u32;
        let mut bytes = [0u8; SECRET_LEN];
        loop {
            rng.fill_bytes(&mut bytes);
            let candidate = BigUint::from_bytes_be(&bytes);
            if candidate < bound {
                bytes.zeroize();
                return Self::from_private(candidate);
            }
        }
    }

    /// Build a key pair from a known private exponent.
    pub fn from_private(private: BigUint) -> Self {
        let public = generator().modpow(&private, prime());
        Self { private, public }
    }

    /// Own public value `g^a mod p`
    pub fn public_value(&self) -> &BigUint {
        &self.public
    }

    /// Decimal wire form of the own public value
    pub fn public_decimal(&self) -> String {
        self.public.to_str_radix(10)
    }

    /// Compute `peer^a mod p` as a 256-byte big-endian secret.
    pub fn agree(&self, peer: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = peer.0.modpow(&self.private, prime());
        if shared <= BigUint::one() {
            return Err(CryptoError::WeakSharedSecret);
        }
        Ok(SharedSecret::from_bytes(left_pad(&shared)))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public_bits", &self.public.bits()).finish_non_exhaustive()
    }
}

/// Big-endian bytes left-padded with zeros to the modulus width.
fn left_pad(value: &BigUint) -> [u8; SECRET_LEN] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; SECRET_LEN];
    let start = SECRET_LEN.saturating_sub(raw.len());
    out[start..].copy_from_slice(&raw[raw.len().saturating_sub(SECRET_LEN)..]);
    out
}
