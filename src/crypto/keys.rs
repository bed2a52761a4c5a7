//! Process-wide key material.
//!
//! Two independent secrets protect every stored field:
//! - a 256-bit **cipher key** for AES-256-CBC, and
//! - a **MAC key** for the HMAC-SHA256 tag over IV + ciphertext.
//!
//! Both are loaded once at startup from the environment as base64 text.
//! A missing or malformed key is a fatal configuration error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::TryRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{MedGuardError, Result};

/// Length of the AES-256 cipher key.
pub const CIPHER_KEY_LEN: usize = 32;

/// Minimum accepted MAC key length (one SHA-256 block of output).
pub const MIN_MAC_KEY_LEN: usize = 32;

/// Environment variable holding the base64 cipher key.
pub const ENCRYPTION_KEY_VAR: &str = "MEDGUARD_ENCRYPTION_KEY";

/// Environment variable holding the base64 MAC key.
pub const HMAC_KEY_VAR: &str = "MEDGUARD_HMAC_KEY";

/// The cipher key and MAC key pair, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKeys {
    cipher_key: [u8; CIPHER_KEY_LEN],
    mac_key: Vec<u8>,
}

impl CipherKeys {
    /// Build keys from raw bytes, validating lengths.
    pub fn new(cipher_key: &[u8], mac_key: &[u8]) -> Result<Self> {
        let cipher_key: [u8; CIPHER_KEY_LEN] = cipher_key.try_into().map_err(|_| {
            MedGuardError::ConfigError(format!(
                "cipher key must be exactly {CIPHER_KEY_LEN} bytes, got {}",
                cipher_key.len()
            ))
        })?;
        if mac_key.len() < MIN_MAC_KEY_LEN {
            return Err(MedGuardError::ConfigError(format!(
                "MAC key must be at least {MIN_MAC_KEY_LEN} bytes, got {}",
                mac_key.len()
            )));
        }
        Ok(Self {
            cipher_key,
            mac_key: mac_key.to_vec(),
        })
    }

    /// Decode both keys from base64 text.
    pub fn from_base64(cipher_key_b64: &str, mac_key_b64: &str) -> Result<Self> {
        let mut cipher_key = BASE64.decode(cipher_key_b64.trim()).map_err(|e| {
            MedGuardError::ConfigError(format!("{ENCRYPTION_KEY_VAR} is not valid base64: {e}"))
        })?;
        let mut mac_key = BASE64.decode(mac_key_b64.trim()).map_err(|e| {
            MedGuardError::ConfigError(format!("{HMAC_KEY_VAR} is not valid base64: {e}"))
        })?;

        let keys = Self::new(&cipher_key, &mac_key);
        cipher_key.zeroize();
        mac_key.zeroize();
        keys
    }

    /// Load both keys from `MEDGUARD_ENCRYPTION_KEY` / `MEDGUARD_HMAC_KEY`.
    pub fn from_env() -> Result<Self> {
        let cipher_key = read_var(ENCRYPTION_KEY_VAR)?;
        let mac_key = read_var(HMAC_KEY_VAR)?;
        Self::from_base64(&cipher_key, &mac_key)
    }

    /// Generate a fresh random key pair from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut cipher_key = [0u8; CIPHER_KEY_LEN];
        let mut mac_key = vec![0u8; MIN_MAC_KEY_LEN];
        let mut rng = rand::rngs::OsRng;
        rng.try_fill_bytes(&mut cipher_key)
            .and_then(|()| rng.try_fill_bytes(&mut mac_key))
            .map_err(|e| MedGuardError::EncryptionFailed(format!("OS random source: {e}")))?;

        let keys = Self::new(&cipher_key, &mac_key);
        cipher_key.zeroize();
        mac_key.zeroize();
        keys
    }

    /// The AES-256 key bytes.
    pub fn cipher_key(&self) -> &[u8; CIPHER_KEY_LEN] {
        &self.cipher_key
    }

    /// The HMAC key bytes.
    pub fn mac_key(&self) -> &[u8] {
        &self.mac_key
    }

    /// Base64 text of (cipher key, MAC key), as `keygen` prints them.
    pub fn to_base64(&self) -> (String, String) {
        (BASE64.encode(self.cipher_key), BASE64.encode(&self.mac_key))
    }
}

// Never print key material.
impl std::fmt::Debug for CipherKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKeys").finish_non_exhaustive()
    }
}

fn read_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MedGuardError::ConfigError(format!(
            "{name} is not set; run `medguard keygen` and export the printed keys"
        ))),
    }
}
