//! Credential hashing
//!
//! Argon2id with the crate defaults; the PHC string carries salt and
//! parameters, so future parameter changes verify old hashes unchanged.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::KalikeError;

pub fn hash_password(password: &str) -> Result<String, KalikeError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| KalikeError::Auth(format!("Password hashing failed: {e}")))
}

/// True when the password matches the stored PHC hash. A malformed stored
/// hash is an error, not a mismatch.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, KalikeError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| KalikeError::Auth(format!("Stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_only_the_right_password() {
        let hash = hash_password("nanna-rahasya-padagalu").unwrap();
        assert!(hash.starts_with("$argon2"));

        assert!(verify_password("nanna-rahasya-padagalu", &hash).unwrap());
        assert!(!verify_password("nanna-rahasya", &hash).unwrap());
    }

    #[test]
    fn test_salting_makes_hashes_unique() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same-password", &a).unwrap());
        assert!(verify_password("same-password", &b).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }
}
