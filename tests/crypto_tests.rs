//! Integration tests for the MedGuard crypto module.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use medguard::crypto::{
    decrypt, decrypt_record, encrypt, encrypt_record, CipherKeys, DecryptErrorKind,
};
use medguard::errors::{ErrorKind, MedGuardError};

fn keys() -> CipherKeys {
    CipherKeys::new(&[0xAB; 32], &[0xCD; 32]).expect("valid keys")
}

// ---------------------------------------------------------------------------
// Authenticated cipher
// ---------------------------------------------------------------------------

#[test]
fn encrypt_produces_different_ciphertext_each_time() {
    let k = keys();
    let ct1 = encrypt(&k, "08:00 AM").expect("encrypt 1");
    let ct2 = encrypt(&k, "08:00 AM").expect("encrypt 2");

    // Fresh IV per call.
    assert_ne!(ct1, ct2);
    assert_eq!(decrypt(&k, &ct1).unwrap(), decrypt(&k, &ct2).unwrap());
}

#[test]
fn any_flipped_bit_is_an_integrity_failure() {
    let k = keys();
    let blob = BASE64.decode(encrypt(&k, "Warfarin 5mg").unwrap()).unwrap();

    for i in 0..blob.len() {
        for bit in 0..8 {
            let mut tampered = blob.clone();
            tampered[i] ^= 1 << bit;
            let result = decrypt(&k, &BASE64.encode(&tampered));
            assert!(
                matches!(result, Err(MedGuardError::IntegrityFailure)),
                "byte {i} bit {bit}: {result:?}"
            );
        }
    }
}

#[test]
fn short_blobs_are_malformed() {
    let k = keys();
    for len in [0usize, 16, 47] {
        let err = decrypt(&k, &BASE64.encode(vec![0u8; len])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed, "len {len}");
    }
}

#[test]
fn wrong_mac_key_is_detected_before_decryption() {
    let k = keys();
    let other = CipherKeys::new(&[0xAB; 32], &[0xEE; 32]).unwrap();
    let ct = encrypt(&k, "secret").unwrap();
    assert!(matches!(
        decrypt(&other, &ct),
        Err(MedGuardError::IntegrityFailure)
    ));
}

// ---------------------------------------------------------------------------
// Type-preserving codec
// ---------------------------------------------------------------------------

#[test]
fn nested_profile_keeps_shape_and_types() {
    let k = keys();
    let profile = json!({
        "medicalInfo": {
            "allergies": ["penicillin", "latex"],
            "weightKg": 61.5,
            "age": 71,
            "diabetic": true,
            "notes": null
        },
        "emergencyContacts": [{ "name": "Tom", "phone": "555-0101" }]
    });

    let sealed = encrypt_record(&k, &profile).unwrap();
    assert!(sealed["medicalInfo"]["age"].is_string());
    assert!(sealed["medicalInfo"]["notes"].is_null());
    assert_eq!(sealed["medicalInfo"]["allergies"].as_array().unwrap().len(), 2);

    let opened = decrypt_record(&k, &sealed);
    assert!(opened.is_complete());
    assert_eq!(opened.into_value(), profile);
}

#[test]
fn numeric_looking_strings_stay_strings() {
    let k = keys();
    let record = json!({ "a": "True", "b": "123", "c": "1.5" });
    let opened = decrypt_record(&k, &encrypt_record(&k, &record).unwrap());
    assert_eq!(opened.into_value(), record);
}

#[test]
fn one_bad_leaf_is_reported_and_the_rest_decrypt() {
    let k = keys();
    let mut sealed = encrypt_record(&k, &json!({ "a": "x", "b": ["y", "z"] })).unwrap();
    sealed["b"][1] = json!("not-a-ciphertext-blob-at-all-but-long-enough-to-decode");

    let opened = decrypt_record(&k, &sealed);
    assert_eq!(opened.failures().len(), 1);
    assert_eq!(opened.failures()[0].path, "b[1]");
    assert_eq!(opened.failures()[0].kind, DecryptErrorKind::Malformed);
    assert_eq!(opened.value()["a"], json!("x"));
    assert_eq!(opened.value()["b"][0], json!("y"));

    let err = opened.into_strict().unwrap_err();
    assert!(matches!(err, MedGuardError::PartialDecryption { count: 1, .. }));
}
