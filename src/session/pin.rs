//! PIN digests as stored in employee snapshots

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lowercase hex SHA-256 of `pin`
pub fn hash_pin(pin: &str) -> String {
    hex::encode(Sha256::digest(pin.as_bytes()))
}

/// Compare `pin` against a stored hex digest. Malformed digests never verify.
pub fn verify_pin(pin: &str, stored_hash: &str) -> bool {
    let Ok(expected) = hex::decode(stored_hash.trim()) else {
        return false;
    };
    let actual = Sha256::digest(pin.as_bytes());
    bool::from(expected.as_slice().ct_eq(actual.as_slice()))
}
