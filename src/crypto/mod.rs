//! Cryptographic primitives for medguard.
//!
//! This module provides:
//! - AES-256-CBC + HMAC-SHA256 encryption of one string value (`cipher`)
//! - Recursive, type-preserving record encryption (`codec`)
//! - Process-wide key material loaded from the environment (`keys`)

pub mod cipher;
pub mod codec;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt_record, decrypt_record, CipherKeys, ...};
pub use cipher::{decrypt, encrypt};
pub use codec::{
    decrypt_fields, decrypt_leaf, decrypt_record, encrypt_fields, encrypt_record,
    DecryptErrorKind, DecryptedRecord, FieldFailure,
};
pub use keys::CipherKeys;
