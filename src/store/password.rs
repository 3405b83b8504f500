use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher as _, PasswordVerifier as _};
use rand::rngs::OsRng;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HashError(pub String);

/// One-way password function used by the user store.
///
/// `verify` answers only yes or no: a stored hash it cannot parse is a "no".
pub trait PasswordHasher: Send + Sync + 'static {
    fn hash(&self, plaintext: &str) -> Result<Vec<u8>, HashError>;
    fn verify(&self, hash: &[u8], plaintext: &str) -> bool;
}

/// Argon2id with the crate defaults, stored as a PHC string.
#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<Vec<u8>, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| HashError(e.to_string()))?;
        Ok(hash.to_string().into_bytes())
    }

    fn verify(&self, hash: &[u8], plaintext: &str) -> bool {
        let parsed = std::str::from_utf8(hash)
            .map_err(|e| e.to_string())
            .and_then(|s| PasswordHash::new(s).map_err(|e| e.to_string()));
        match parsed {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                warn!(error = %e, "stored password hash is not a valid PHC string");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hasher = Argon2Hasher::default();
        let hash = hasher.hash("Secur3P@ssw0rd!").expect("hashing should succeed");
        assert!(hasher.verify(&hash, "Secur3P@ssw0rd!"));
        assert!(!hasher.verify(&hash, "wrong-password"));
    }

    #[test]
    fn hash_never_contains_plaintext() {
        let hasher = Argon2Hasher::default();
        let hash = hasher.hash("correct-horse-battery-staple").unwrap();
        let text = String::from_utf8(hash).unwrap();
        assert!(text.starts_with("$argon2id$"));
        assert!(!text.contains("correct-horse"));
    }

    #[test]
    fn malformed_hash_is_rejected_not_an_error() {
        let hasher = Argon2Hasher::default();
        assert!(!hasher.verify(b"not-a-valid-hash", "anything"));
        assert!(!hasher.verify(&[0xff, 0xfe], "anything"));
    }
}
