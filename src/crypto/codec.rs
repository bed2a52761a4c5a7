//! Type-preserving field encryption for nested records.
//!
//! Containers (objects and arrays) keep their shape in plaintext; every
//! scalar leaf is replaced by an [`cipher`](super::cipher) blob.  `null`
//! leaves are stored as `null`.
//!
//! The plaintext of each leaf starts with a one-byte type tag so the
//! original JSON type comes back without guessing:
//!
//! ```text
//! 0x01 bool   "true" | "false"
//! 0x02 int    i64 decimal
//! 0x03 uint   u64 decimal (only above i64::MAX)
//! 0x04 float  shortest round-trip decimal
//! 0x05 string raw UTF-8
//! ```
//!
//! Blobs without a tag byte predate this format and are decoded with
//! [`infer_legacy`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use super::cipher;
use super::keys::CipherKeys;
use crate::errors::{MedGuardError, Result};

const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_UINT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STRING: u8 = 0x05;

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt every scalar leaf of `value`, preserving keys, order and nesting.
pub fn encrypt_record(keys: &CipherKeys, value: &Value) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), encrypt_record(keys, v)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| encrypt_record(keys, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Null => Ok(Value::Null),
        scalar => encrypt_scalar(keys, scalar).map(Value::String),
    }
}

/// Encrypt one scalar into a blob.  Containers and `null` are rejected.
pub fn encrypt_scalar(keys: &CipherKeys, value: &Value) -> Result<String> {
    let mut plaintext = tagged_plaintext(value)?;
    let blob = cipher::encrypt_bytes(keys, &plaintext);
    zeroize::Zeroize::zeroize(&mut plaintext);
    blob
}

/// Encrypt a record but leave the `exempt` top-level fields in plaintext.
pub fn encrypt_fields(
    keys: &CipherKeys,
    record: &Map<String, Value>,
    exempt: &[&str],
) -> Result<Map<String, Value>> {
    let mut out = Map::with_capacity(record.len());
    for (k, v) in record {
        let stored = if exempt.contains(&k.as_str()) {
            v.clone()
        } else {
            encrypt_record(keys, v)?
        };
        out.insert(k.clone(), stored);
    }
    Ok(out)
}

/// Serialize `data` to JSON and encrypt it leaf-wise.
pub fn encrypt_serializable<T: Serialize>(keys: &CipherKeys, data: &T) -> Result<Value> {
    let value = serde_json::to_value(data)
        .map_err(|e| MedGuardError::UnsupportedType(format!("cannot represent value: {e}")))?;
    encrypt_record(keys, &value)
}

fn tagged_plaintext(value: &Value) -> Result<Vec<u8>> {
    let (tag, text) = match value {
        Value::Bool(b) => (TAG_BOOL, b.to_string()),
        Value::Number(n) => number_plaintext(n)?,
        Value::String(s) => (TAG_STRING, s.clone()),
        Value::Null => {
            return Err(MedGuardError::UnsupportedType(
                "null is never encrypted".into(),
            ))
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(MedGuardError::UnsupportedType(
                "containers are walked, not encrypted as a leaf".into(),
            ))
        }
    };

    let mut plaintext = Vec::with_capacity(1 + text.len());
    plaintext.push(tag);
    plaintext.extend_from_slice(text.as_bytes());
    Ok(plaintext)
}

fn number_plaintext(n: &Number) -> Result<(u8, String)> {
    if let Some(i) = n.as_i64() {
        return Ok((TAG_INT, i.to_string()));
    }
    if let Some(u) = n.as_u64() {
        return Ok((TAG_UINT, u.to_string()));
    }
    n.as_f64()
        .filter(|f| f.is_finite())
        .map(|f| (TAG_FLOAT, f.to_string()))
        .ok_or_else(|| MedGuardError::UnsupportedType(format!("number {n} is not finite")))
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Which crypto check a leaf failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptErrorKind {
    Malformed,
    Integrity,
    PaddingOrKey,
}

/// One leaf that could not be decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    /// Location of the leaf, e.g. `medicalInfo.allergies[1]`, or `$` for a bare scalar.
    pub path: String,
    pub kind: DecryptErrorKind,
}

/// Result of decrypting a record: the decrypted shape plus any leaves
/// that stayed as stored ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedRecord {
    value: Value,
    failures: Vec<FieldFailure>,
}

impl DecryptedRecord {
    /// `true` when every encrypted leaf decrypted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Leaves that failed, in walk order.
    pub fn failures(&self) -> &[FieldFailure] {
        &self.failures
    }

    /// Borrow the (possibly partial) value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Take the value, accepting that failed leaves still hold ciphertext.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Take the value only if every leaf decrypted.
    pub fn into_strict(self) -> Result<Value> {
        match self.failures.first() {
            None => Ok(self.value),
            Some(first) => Err(MedGuardError::PartialDecryption {
                count: self.failures.len(),
                first: first.path.clone(),
            }),
        }
    }
}

/// Decrypt every ciphertext leaf of `value`.
///
/// A leaf that fails keeps its stored value and is listed in
/// [`DecryptedRecord::failures`]; the walk never stops early.
pub fn decrypt_record(keys: &CipherKeys, value: &Value) -> DecryptedRecord {
    let mut failures = Vec::new();
    let value = decrypt_walk(keys, value, &mut String::new(), &mut failures);
    DecryptedRecord { value, failures }
}

/// Decrypt a record, leaving the `exempt` top-level fields as stored.
pub fn decrypt_fields(
    keys: &CipherKeys,
    record: &Map<String, Value>,
    exempt: &[&str],
) -> DecryptedRecord {
    let mut failures = Vec::new();
    let mut out = Map::with_capacity(record.len());
    for (k, v) in record {
        let plain = if exempt.contains(&k.as_str()) {
            v.clone()
        } else {
            let mut path = k.clone();
            decrypt_walk(keys, v, &mut path, &mut failures)
        };
        out.insert(k.clone(), plain);
    }
    DecryptedRecord {
        value: Value::Object(out),
        failures,
    }
}

/// Decrypt a record strictly and deserialize it into `T`.
pub fn decrypt_deserialize<T: DeserializeOwned>(keys: &CipherKeys, value: &Value) -> Result<T> {
    let plain = decrypt_record(keys, value).into_strict()?;
    serde_json::from_value(plain)
        .map_err(|e| MedGuardError::SerializationError(format!("decrypted record: {e}")))
}

/// Decrypt a single blob and restore its type.
pub fn decrypt_leaf(keys: &CipherKeys, blob: &str) -> Result<Value> {
    let plaintext = cipher::decrypt_bytes(keys, blob)?;
    decode_plaintext(plaintext)
}

fn decrypt_walk(
    keys: &CipherKeys,
    value: &Value,
    path: &mut String,
    failures: &mut Vec<FieldFailure>,
) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let len = path.len();
                if !path.is_empty() {
                    path.push('.');
                }
                path.push_str(k);
                out.insert(k.clone(), decrypt_walk(keys, v, path, failures));
                path.truncate(len);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                out.push(decrypt_walk(keys, item, path, failures));
                path.truncate(len);
            }
            Value::Array(out)
        }
        Value::String(blob) => match decrypt_leaf(keys, blob) {
            Ok(plain) => plain,
            Err(e) => {
                failures.push(FieldFailure {
                    path: if path.is_empty() { "$".into() } else { path.clone() },
                    kind: failure_kind(&e),
                });
                value.clone()
            }
        },
        // Plaintext scalars (never encrypted) and null pass through.
        other => other.clone(),
    }
}

fn failure_kind(err: &MedGuardError) -> DecryptErrorKind {
    match err {
        MedGuardError::IntegrityFailure => DecryptErrorKind::Integrity,
        MedGuardError::PaddingOrKeyError => DecryptErrorKind::PaddingOrKey,
        _ => DecryptErrorKind::Malformed,
    }
}

fn decode_plaintext(mut plaintext: Vec<u8>) -> Result<Value> {
    let tag = plaintext.first().copied();
    let body_start = match tag {
        Some(TAG_BOOL..=TAG_STRING) => 1,
        _ => 0,
    };

    let text = std::str::from_utf8(&plaintext[body_start..])
        .map_err(|_| MedGuardError::PaddingOrKeyError)?;

    let value = match tag {
        Some(TAG_BOOL) => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(bad_payload("bool")),
        },
        Some(TAG_INT) => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad_payload("int")),
        Some(TAG_UINT) => text
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| bad_payload("uint")),
        Some(TAG_FLOAT) => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| bad_payload("float")),
        Some(TAG_STRING) => Ok(Value::String(text.to_string())),
        _ => Ok(infer_legacy(text)),
    };

    zeroize::Zeroize::zeroize(&mut plaintext);
    value
}

fn bad_payload(kind: &str) -> MedGuardError {
    MedGuardError::MalformedCiphertext(format!("tagged {kind} payload does not parse"))
}

/// Decode an untagged (legacy) plaintext by inspecting its text.
///
/// `"True"`/`"False"` become booleans, all-digit text becomes an integer,
/// anything that parses as a finite float becomes a float, everything else
/// stays a string.  Strings that merely look like numbers or booleans are
/// misread; that is why new blobs carry a type tag.
pub fn infer_legacy(text: &str) -> Value {
    match text {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        _ => {}
    }

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(u) = text.parse::<u64>() {
            return Value::from(u);
        }
    }

    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(text.to_string()), Value::Number)
}
