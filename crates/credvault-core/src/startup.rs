//! Panicking constructors for process startup.
//!
//! A service that cannot be built from its configuration leaves the process
//! with nothing useful to do, so binaries may prefer to abort early. These
//! helpers are compiled only with the `startup` feature and must not be used
//! on request paths.

#![allow(clippy::panic)]

use crate::cipher::{EncryptionKey, SymmetricCipher};
use crate::config::{CredvaultConfig, Services};
use crate::password::{HashConfig, PasswordHasher};
use crate::token::{TokenConfig, TokenManager};

/// # Panics
///
/// Panics if the hash configuration is invalid.
#[must_use]
pub fn must_password_hasher(config: HashConfig) -> PasswordHasher {
    PasswordHasher::new(config).unwrap_or_else(|e| panic!("password hasher: {e}"))
}

/// # Panics
///
/// Panics if the token configuration or key material is invalid.
#[must_use]
pub fn must_token_manager(config: TokenConfig) -> TokenManager {
    TokenManager::new(config).unwrap_or_else(|e| panic!("token manager: {e}"))
}

/// # Panics
///
/// Panics if `encoded` is not standard base64 of a 16, 24, or 32 byte key.
#[must_use]
pub fn must_cipher_from_base64(encoded: &str) -> SymmetricCipher {
    let key = EncryptionKey::from_base64(encoded).unwrap_or_else(|e| panic!("cipher key: {e}"));
    SymmetricCipher::new(key)
}

/// # Panics
///
/// Panics if any service rejects its configuration.
#[must_use]
pub fn must_services(config: &CredvaultConfig, key: Option<EncryptionKey>) -> Services {
    config
        .build(key)
        .unwrap_or_else(|e| panic!("credvault services: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SigningKeys;

    #[test]
    fn builds_from_valid_config() {
        let manager = must_token_manager(TokenConfig {
            keys: SigningKeys::hmac("0123456789abcdef0123456789abcdef"),
            ..TokenConfig::default()
        });
        assert_eq!(manager.issuer(), "credvault");

        let cipher = must_cipher_from_base64("AAAAAAAAAAAAAAAAAAAAAA==");
        assert_eq!(cipher.key_size().bits(), 128);
    }

    #[test]
    #[should_panic(expected = "token manager")]
    fn panics_on_missing_secret() {
        let _ = must_token_manager(TokenConfig::default());
    }

    #[test]
    #[should_panic(expected = "password hasher")]
    fn panics_on_invalid_cost() {
        let _ = must_password_hasher(HashConfig {
            bcrypt_cost: 2,
            ..HashConfig::default()
        });
    }
}
