//! AES-256-CBC + HMAC-SHA256 encrypt-then-MAC for single string values.
//!
//! Each call to `encrypt` draws a fresh 16-byte IV from the OS random
//! source.  The tag covers IV and ciphertext, and `decrypt` checks it
//! before any block is decrypted.
//!
//! Layout of the decoded blob (stored as standard base64 text):
//!   [ 16-byte IV | ciphertext (PKCS#7, multiple of 16) | 32-byte HMAC ]

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::TryRngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use super::keys::CipherKeys;
use crate::errors::{MedGuardError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

/// Size of the HMAC-SHA256 tag in bytes.
pub const TAG_LEN: usize = 32;

/// Smallest decoded blob we accept: IV + tag.
pub const MIN_BLOB_LEN: usize = IV_LEN + TAG_LEN;

/// Encrypt `plaintext` and return base64(IV || ciphertext || tag).
///
/// Only fails if the OS random source is unavailable.
pub fn encrypt(keys: &CipherKeys, plaintext: &str) -> Result<String> {
    encrypt_bytes(keys, plaintext.as_bytes())
}

/// Byte-level variant of [`encrypt`], used by the codec for tagged plaintexts.
pub fn encrypt_bytes(keys: &CipherKeys, plaintext: &[u8]) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| MedGuardError::EncryptionFailed(format!("OS random source: {e}")))?;

    let encryptor = Aes256CbcEnc::new_from_slices(keys.cipher_key(), &iv)
        .map_err(|e| MedGuardError::EncryptionFailed(format!("invalid key length: {e}")))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let tag = compute_tag(keys.mac_key(), &iv, &ciphertext)?;

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    blob.extend_from_slice(&tag);
    Ok(BASE64.encode(blob))
}

/// Decrypt a blob produced by [`encrypt`] back into its UTF-8 string.
pub fn decrypt(keys: &CipherKeys, blob: &str) -> Result<String> {
    let plaintext = decrypt_bytes(keys, blob)?;
    String::from_utf8(plaintext).map_err(|e| {
        let mut bad_bytes = e.into_bytes();
        bad_bytes.zeroize();
        MedGuardError::PaddingOrKeyError
    })
}

/// Byte-level variant of [`decrypt`].
pub fn decrypt_bytes(keys: &CipherKeys, blob: &str) -> Result<Vec<u8>> {
    let data = decode_base64(blob)?;

    if data.len() < MIN_BLOB_LEN {
        return Err(MedGuardError::MalformedCiphertext(format!(
            "decoded length {} is below the {MIN_BLOB_LEN}-byte minimum",
            data.len()
        )));
    }

    let (iv, rest) = data.split_at(IV_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

    // Authenticate first; never decrypt unauthenticated bytes.
    verify_tag(keys.mac_key(), iv, ciphertext, tag)?;

    let decryptor = Aes256CbcDec::new_from_slices(keys.cipher_key(), iv)
        .map_err(|_| MedGuardError::PaddingOrKeyError)?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| MedGuardError::PaddingOrKeyError)
}

/// Compute HMAC-SHA256 over IV || ciphertext.
fn compute_tag(mac_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(mac_key)
        .map_err(|e| MedGuardError::EncryptionFailed(format!("invalid HMAC key: {e}")))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time tag check via `Mac::verify_slice`.
fn verify_tag(mac_key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<()> {
    let mut mac =
        HmacSha256::new_from_slice(mac_key).map_err(|_| MedGuardError::IntegrityFailure)?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| MedGuardError::IntegrityFailure)
}

/// Decode standard base64, tolerating stripped `=` padding.
fn decode_base64(blob: &str) -> Result<Vec<u8>> {
    let trimmed = blob.trim();
    let unpadded = trimmed.trim_end_matches('=');
    BASE64_NO_PAD
        .decode(unpadded)
        .map_err(|e| MedGuardError::MalformedCiphertext(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> CipherKeys {
        CipherKeys::new(&[0x11; 32], &[0x22; 32]).unwrap()
    }

    #[test]
    fn blob_layout_has_iv_and_tag() {
        let blob = encrypt(&keys(), "Metformin").unwrap();
        let raw = BASE64.decode(&blob).unwrap();
        // 9 bytes of plaintext pad to one block.
        assert_eq!(raw.len(), IV_LEN + 16 + TAG_LEN);
    }

    #[test]
    fn empty_plaintext_still_produces_a_padding_block() {
        let blob = encrypt(&keys(), "").unwrap();
        let raw = BASE64.decode(&blob).unwrap();
        assert_eq!(raw.len(), IV_LEN + 16 + TAG_LEN);
        assert_eq!(decrypt(&keys(), &blob).unwrap(), "");
    }

    #[test]
    fn missing_base64_padding_is_tolerated() {
        let blob = encrypt(&keys(), "x").unwrap();
        let stripped = blob.trim_end_matches('=');
        assert_eq!(decrypt(&keys(), stripped).unwrap(), "x");
    }

    #[test]
    fn exactly_minimum_length_without_body_is_not_malformed() {
        // 48 zero bytes: long enough, so the tag check runs and rejects it.
        let blob = BASE64.encode([0u8; MIN_BLOB_LEN]);
        assert!(matches!(
            decrypt(&keys(), &blob),
            Err(MedGuardError::IntegrityFailure)
        ));
    }

    #[test]
    fn valid_tag_over_empty_body_is_a_padding_error() {
        let k = keys();
        let iv = [7u8; IV_LEN];
        let tag = compute_tag(k.mac_key(), &iv, &[]).unwrap();
        let mut raw = iv.to_vec();
        raw.extend_from_slice(&tag);
        let blob = BASE64.encode(raw);
        assert!(matches!(
            decrypt(&k, &blob),
            Err(MedGuardError::PaddingOrKeyError)
        ));
    }

    #[test]
    fn wrong_cipher_key_with_right_mac_key_is_padding_or_key_error() {
        let blob = encrypt(&keys(), "Lisinopril 10mg").unwrap();
        let other = CipherKeys::new(&[0x99; 32], &[0x22; 32]).unwrap();
        match decrypt(&other, &blob) {
            // Wrong key almost always breaks PKCS#7; on the rare valid
            // padding the bytes are garbage and usually not UTF-8.
            Err(MedGuardError::PaddingOrKeyError) => {}
            Ok(text) => assert_ne!(text, "Lisinopril 10mg"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
