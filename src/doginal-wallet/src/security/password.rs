//! Password hashing and strength rules.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// PBKDF2-HMAC-SHA256 rounds for the password hash.
pub const KDF_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Salted password hash persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub hash: String,
    pub salt: String,
}

impl PasswordRecord {
    /// Derive a record with a fresh random salt.
    pub fn derive(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = kdf(password, &salt);

        Self {
            hash: hex::encode(hash),
            salt: hex::encode(salt),
        }
    }

    /// Recompute with the stored salt and compare in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let Ok(salt) = hex::decode(&self.salt) else {
            return false;
        };
        let Ok(stored) = hex::decode(&self.hash) else {
            return false;
        };

        let computed = kdf(password, &salt);
        stored.ct_eq(&computed).into()
    }
}

fn kdf(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut out);
    out
}

/// A password must satisfy at least four of: length >= 8, an uppercase
/// letter, a lowercase letter, a digit, a symbol.
pub fn is_strong(password: &str) -> bool {
    let classes = [
        password.chars().count() >= 8,
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
    ];

    classes.iter().filter(|passed| **passed).count() >= 4
}
