//! Core library for `credvault`.
//!
//! Three independent services for protecting credentials and secrets:
//!
//! - [`password::PasswordHasher`] derives and verifies password hashes with
//!   bcrypt or Argon2id.
//! - [`token::TokenManager`] issues and verifies signed JWTs (HMAC or RSA).
//! - [`cipher::SymmetricCipher`] seals and opens byte payloads with AES-GCM.
//!
//! The services never call each other and hold no global state. Each is
//! built from a plain configuration value and is immutable afterwards, so a
//! single instance can be shared across threads. The crate performs no file,
//! network, or environment I/O; key material and settings are supplied by the
//! caller.

pub mod cipher;
pub mod clock;
pub mod config;
pub mod error;
pub mod password;
#[cfg(feature = "startup")]
pub mod startup;
pub mod token;

pub use cipher::{EncryptionKey, KeySize, SymmetricCipher};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CredvaultConfig, Services};
pub use error::{CipherError, Error, ErrorKind, PasswordError, TokenError};
pub use password::{HashAlgorithm, HashConfig, PasswordHasher};
pub use token::{
    Claims, SigningKeys, TokenAlgorithm, TokenConfig, TokenManager, TokenPair, TokenType,
};
