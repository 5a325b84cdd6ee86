//! Password handling for administrator accounts.
//!
//! Only a salted bcrypt hash is ever stored. The plaintext is write-only:
//! [`User::password`] always fails.

use bcrypt::DEFAULT_COST;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::User;

pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt only reads this many bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password is not a readable attribute")]
    NotReadable,

    #[error("Password must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("Password must be at most {max} bytes long")]
    TooLong { max: usize },

    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Hash a plaintext password after checking the length policy.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, CredentialError> {
    if plaintext.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::TooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    if plaintext.len() > MAX_PASSWORD_BYTES {
        return Err(CredentialError::TooLong {
            max: MAX_PASSWORD_BYTES,
        });
    }
    Ok(bcrypt::hash(plaintext, cost)?)
}

impl User {
    /// New account with a normalized email and a freshly hashed password.
    pub fn new(email: &str, plaintext: &str, cost: u32) -> Result<Self, CredentialError> {
        Ok(Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash: hash_password(plaintext, cost)?,
            created_at: Utc::now(),
        })
    }

    /// Account from an externally produced bcrypt hash (seeded from config).
    pub fn with_hash(email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash,
            created_at: Utc::now(),
        }
    }

    pub fn set_password(&mut self, plaintext: &str) -> Result<(), CredentialError> {
        self.set_password_with_cost(plaintext, DEFAULT_COST)
    }

    pub fn set_password_with_cost(
        &mut self,
        plaintext: &str,
        cost: u32,
    ) -> Result<(), CredentialError> {
        self.password_hash = hash_password(plaintext, cost)?;
        Ok(())
    }

    /// Compare against the stored hash. Malformed or missing hashes yield
    /// `false`, as does input longer than bcrypt can tell apart.
    pub fn verify_password(&self, plaintext: &str) -> bool {
        if self.password_hash.is_empty() || plaintext.len() > MAX_PASSWORD_BYTES {
            return false;
        }
        bcrypt::verify(plaintext, &self.password_hash).unwrap_or(false)
    }

    /// The plaintext is never kept; reading it always fails.
    pub fn password(&self) -> Result<String, CredentialError> {
        Err(CredentialError::NotReadable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_verify_accepts_only_the_set_password() {
        let mut user = User::new("Admin@Example.com ", "correct horse", TEST_COST).unwrap();
        assert_eq!(user.email, "admin@example.com");
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("correct horsE"));
        assert!(!user.verify_password(""));

        user.set_password_with_cost("battery staple", TEST_COST).unwrap();
        assert!(user.verify_password("battery staple"));
        assert!(!user.verify_password("correct horse"));
    }

    #[test]
    fn test_plaintext_is_never_readable() {
        for pw in ["longenough", "another one!", "ünïcödé-pass"] {
            let user = User::new("a@b.c", pw, TEST_COST).unwrap();
            assert!(matches!(user.password(), Err(CredentialError::NotReadable)));
            assert!(!user.password_hash.contains(pw));
        }
    }

    #[test]
    fn test_short_or_empty_password_is_rejected() {
        assert!(matches!(
            User::new("a@b.c", "", TEST_COST),
            Err(CredentialError::TooShort { .. })
        ));
        assert!(matches!(
            hash_password("short", TEST_COST),
            Err(CredentialError::TooShort { min: 8 })
        ));
    }

    #[test]
    fn test_password_beyond_bcrypt_input_is_rejected() {
        assert!(matches!(
            hash_password(&"a".repeat(80), TEST_COST),
            Err(CredentialError::TooLong { max: 72 })
        ));
        // multi-byte characters count by their encoded size
        assert!(matches!(
            hash_password(&"é".repeat(40), TEST_COST),
            Err(CredentialError::TooLong { .. })
        ));
        assert!(hash_password(&"a".repeat(72), TEST_COST).is_ok());
    }

    #[test]
    fn test_longer_input_sharing_the_prefix_does_not_verify() {
        let exact = "a".repeat(MAX_PASSWORD_BYTES);
        let user = User::new("a@b.c", &exact, TEST_COST).unwrap();
        assert!(user.verify_password(&exact));
        assert!(!user.verify_password(&format!("{}DIFFERENT", exact)));
        assert!(!user.verify_password(&format!("{}a", exact)));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        let user = User::with_hash("a@b.c", "not-a-bcrypt-hash".to_string());
        assert!(!user.verify_password("anything at all"));
        let empty = User::with_hash("a@b.c", String::new());
        assert!(!empty.verify_password(""));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same password", TEST_COST).unwrap();
        let b = hash_password("same password", TEST_COST).unwrap();
        assert_ne!(a, b);
    }
}
