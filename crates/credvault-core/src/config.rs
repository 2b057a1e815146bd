//! Aggregate configuration for the three services.
//!
//! The core never reads files or the environment. An outer loader parses
//! whatever source it likes into [`CredvaultConfig`] and hands the pieces to
//! the service constructors, or calls [`CredvaultConfig::build`] to get all
//! of them at once.

use serde::Deserialize;

use crate::cipher::{EncryptionKey, KeySize, SymmetricCipher};
use crate::error::Error;
use crate::password::{HashConfig, PasswordHasher};
use crate::token::{TokenConfig, TokenManager};

/// Settings for the symmetric cipher. The key itself is supplied separately.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// Size of newly generated keys.
    pub key_size: KeySize,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            key_size: KeySize::Aes256,
        }
    }
}

/// Top-level configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredvaultConfig {
    pub password: HashConfig,
    pub token: TokenConfig,
    pub cipher: CipherConfig,
}

/// Explicitly constructed service objects.
#[derive(Debug)]
pub struct Services {
    pub hasher: PasswordHasher,
    pub tokens: TokenManager,
    /// Present only when a key was supplied.
    pub cipher: Option<SymmetricCipher>,
}

impl CredvaultConfig {
    /// Parse a JSON document. Missing sections and fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for invalid JSON or out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Construct every service, failing on the first invalid section.
    ///
    /// # Errors
    ///
    /// Returns the constructor error of the first service that rejects its
    /// configuration, wrapped in [`Error`].
    pub fn build(&self, encryption_key: Option<EncryptionKey>) -> Result<Services, Error> {
        let hasher = PasswordHasher::new(self.password.clone())?;
        let tokens = TokenManager::new(self.token.clone())?;
        let cipher = encryption_key.map(SymmetricCipher::new);
        Ok(Services {
            hasher,
            tokens,
            cipher,
        })
    }
}
