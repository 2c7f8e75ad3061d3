//! Symmetric envelope: `msg_key || AES-256-CBC(padded plaintext)`.
//!
//! The per-message key and IV are derived from the connection secret and a
//! 16-byte `msg_key` that is itself a digest of the padded plaintext, so the
//! same plaintext under the same secret always seals to the same bytes.

use aes::{
    Aes256,
    cipher::{
        BlockDecryptMut, BlockEncryptMut, KeyIvInit,
        block_padding::{NoPadding, Pkcs7, RawPadding},
    },
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{error::EnvelopeError, secret::SharedSecret};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the `msg_key` prefix.
pub const MSG_KEY_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Encrypt `plaintext` under `secret`.
pub fn seal(secret: &SharedSecret, plaintext: &[u8]) -> Vec<u8> {
    let padded = Zeroizing::new(pkcs7_pad(plaintext));
    let msg_key = msg_key_for(&padded);
    let (key, iv) = derive(secret, &msg_key);

    let ciphertext = Aes256CbcEnc::new(key.as_slice().into(), iv.as_slice().into())
        .encrypt_padded_vec_mut::<NoPadding>(&padded);

    let mut out = Vec::with_capacity(MSG_KEY_LEN + ciphertext.len());
    out.extend_from_slice(&msg_key);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt an envelope produced by [`seal`].
///
/// Fails on short or misaligned input, bad padding, or when the `msg_key`
/// recomputed from the decrypted plaintext does not match the prefix.
pub fn open(secret: &SharedSecret, data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if data.len() < MSG_KEY_LEN {
        return Err(EnvelopeError::TooShort(data.len()));
    }
    let (received_key, ciphertext) = data.split_at(MSG_KEY_LEN);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(EnvelopeError::Misaligned(ciphertext.len()));
    }

    let mut msg_key = [0u8; MSG_KEY_LEN];
    msg_key.copy_from_slice(received_key);
    let (key, iv) = derive(secret, &msg_key);

    let padded = Zeroizing::new(
        Aes256CbcDec::new(key.as_slice().into(), iv.as_slice().into())
            .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
            .map_err(|_| EnvelopeError::Misaligned(ciphertext.len()))?,
    );

    let plaintext_len = pkcs7_unpadded_len(&padded).ok_or(EnvelopeError::Padding)?;

    let expected = msg_key_for(&padded);
    if !bool::from(expected[..].ct_eq(&msg_key[..])) {
        return Err(EnvelopeError::MsgKeyMismatch);
    }

    Ok(padded[..plaintext_len].to_vec())
}

/// Middle 128 bits of SHA-256 over the padded plaintext.
fn msg_key_for(padded: &[u8]) -> [u8; MSG_KEY_LEN] {
    let digest = Sha256::digest(padded);
    let mut key = [0u8; MSG_KEY_LEN];
    key.copy_from_slice(&digest[8..24]);
    key
}

/// `key = SHA-256(msg_key || secret[0..32])`,
/// `iv = SHA-256(secret[32..64] || msg_key)[0..16]`.
fn derive(
    secret: &SharedSecret,
    msg_key: &[u8; MSG_KEY_LEN],
) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; BLOCK_LEN]>) {
    let key: [u8; 32] =
        Sha256::new().chain_update(msg_key).chain_update(secret.key_half()).finalize().into();
    let iv_material: [u8; 32] =
        Sha256::new().chain_update(secret.iv_half()).chain_update(msg_key).finalize().into();

    let mut iv = [0u8; BLOCK_LEN];
    iv.copy_from_slice(&iv_material[..BLOCK_LEN]);
    (Zeroizing::new(key), Zeroizing::new(iv))
}

/// Pad to a whole number of blocks; aligned input gains a full pad block.
fn pkcs7_pad(plaintext: &[u8]) -> Vec<u8> {
    let tail = plaintext.len() % BLOCK_LEN;
    let padded_len = plaintext.len() - tail + BLOCK_LEN;
    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(plaintext);
    padded.resize(padded_len, 0);
    Pkcs7::raw_pad(&mut padded[padded_len - BLOCK_LEN..], tail);
    padded
}

/// Length of the plaintext inside a PKCS#7-padded buffer, if the buffer is
/// block aligned and its final block carries valid padding.
fn pkcs7_unpadded_len(padded: &[u8]) -> Option<usize> {
    if padded.is_empty() || padded.len() % BLOCK_LEN != 0 {
        return None;
    }
    let last = padded.len() - BLOCK_LEN;
    Pkcs7::raw_unpad(&padded[last..]).ok().map(|body| last + body.len())
}
