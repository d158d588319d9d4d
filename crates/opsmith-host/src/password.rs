//! Password generation and hashing for user management

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use sha_crypt::{Sha512Params, sha512_simple};

use crate::error::HostError;

/// Length of generated passwords
const GENERATED_LEN: usize = 12;

/// Generate a random password from the OS entropy source, over the
/// mixed alphanumeric alphabet.
pub(crate) fn generate() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_LEN)
        .map(char::from)
        .collect()
}

/// Freshly salted SHA-512-crypt hash, suitable for `useradd -p`.
pub(crate) fn crypt(password: &str) -> Result<String, HostError> {
    let params = Sha512Params::new(10_000).map_err(|_| HostError::PasswordHash)?;
    sha512_simple(password, &params).map_err(|_| HostError::PasswordHash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_twelve_alphanumerics() {
        let password = generate();
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(char::is_alphanumeric));
    }

    #[test]
    fn generated_passwords_differ() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn crypt_produces_sha512_crypt_format() {
        let hash = crypt("hunter2").unwrap();
        assert!(hash.starts_with("$6$"));
        // Never the plaintext
        assert!(!hash.contains("hunter2"));
    }
}
