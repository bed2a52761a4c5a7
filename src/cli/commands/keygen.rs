//! `medguard keygen`: print a fresh key pair as shell exports.
//!
//! Usage:
//!   eval "$(medguard keygen)"

use crate::cli::output;
use crate::crypto::keys::{CipherKeys, ENCRYPTION_KEY_VAR, HMAC_KEY_VAR};
use crate::errors::Result;

/// Execute the `keygen` command.
pub fn execute() -> Result<()> {
    let keys = CipherKeys::generate()?;
    for line in export_lines(&keys) {
        println!("{line}");
    }
    output::warning("Store these keys securely. Records cannot be read without them.");
    Ok(())
}

fn export_lines(keys: &CipherKeys) -> [String; 2] {
    let (cipher_key, mac_key) = keys.to_base64();
    [
        format!("export {ENCRYPTION_KEY_VAR}={cipher_key}"),
        format!("export {HMAC_KEY_VAR}={mac_key}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_lines_load_back() {
        let keys = CipherKeys::generate().unwrap();
        let lines = export_lines(&keys);

        let value = |line: &str| line.split_once('=').unwrap().1.to_string();
        assert!(lines[0].starts_with("export MEDGUARD_ENCRYPTION_KEY="));
        assert!(lines[1].starts_with("export MEDGUARD_HMAC_KEY="));

        let loaded = CipherKeys::from_base64(&value(&lines[0]), &value(&lines[1])).unwrap();
        assert_eq!(loaded.cipher_key(), keys.cipher_key());
        assert_eq!(loaded.mac_key(), keys.mac_key());
    }
}
