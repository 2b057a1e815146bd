//! Password hashing and verification.
//!
//! Two interchangeable algorithms: bcrypt and Argon2id. Hashes are
//! self-describing, so [`PasswordHasher::verify`] recovers the algorithm and
//! the exact parameters used at creation from the stored string.
//!
//! Argon2id layout (unpadded standard base64 for salt and digest):
//!
//! ```text
//! $argon2id$v=19$m=<memory KiB>,t=<iterations>,p=<parallelism>$<salt>$<digest>
//! ```
//!
//! # Security model
//!
//! - Salts come from `OsRng`, fresh for every hash.
//! - Verification recomputes with the stored parameters, never current
//!   defaults, and compares digests with `subtle::ConstantTimeEq`.
//! - A wrong password is `Ok(false)`. An unparseable hash is
//!   [`PasswordError::Malformed`], never reported as a wrong password.

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::PasswordError;

/// bcrypt only reads the first 72 bytes of a password.
pub const BCRYPT_MAX_PASSWORD_LEN: usize = 72;

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];
const ARGON2ID_PREFIX: &str = "$argon2id$";
const MIN_SALT_LEN: usize = 8;
const MIN_OUTPUT_LEN: usize = 4;

/// Supported password hashing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Bcrypt,
    #[serde(alias = "argon2")]
    Argon2id,
}

impl HashAlgorithm {
    /// Identify the algorithm that produced `encoded` from its prefix.
    ///
    /// Returns `None` for anything that is neither bcrypt nor Argon2id.
    #[must_use]
    pub fn detect(encoded: &str) -> Option<Self> {
        if encoded.starts_with(ARGON2ID_PREFIX) {
            Some(Self::Argon2id)
        } else if BCRYPT_PREFIXES.iter().any(|p| encoded.starts_with(p)) {
            Some(Self::Bcrypt)
        } else {
            None
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bcrypt => "bcrypt",
            Self::Argon2id => "argon2id",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = PasswordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(Self::Bcrypt),
            "argon2id" | "argon2" => Ok(Self::Argon2id),
            other => Err(PasswordError::Configuration {
                reason: format!("unsupported hashing algorithm: {other}"),
            }),
        }
    }
}

/// Cost parameters for both algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    /// bcrypt cost factor (4..=31).
    pub bcrypt_cost: u32,
    /// Argon2 memory in KiB.
    pub argon2_memory_kib: u32,
    /// Argon2 iterations.
    pub argon2_iterations: u32,
    /// Argon2 lanes.
    pub argon2_parallelism: u32,
    /// Argon2 digest length in bytes.
    pub argon2_output_len: usize,
    /// Argon2 salt length in bytes.
    pub argon2_salt_len: usize,
    /// Highest bcrypt cost a stored hash may carry.
    pub bcrypt_max_cost: u32,
    /// Highest Argon2 memory (KiB) a stored hash may carry.
    pub argon2_max_memory_kib: u32,
    /// Highest Argon2 iteration count a stored hash may carry.
    pub argon2_max_iterations: u32,
    /// Highest Argon2 lane count a stored hash may carry.
    pub argon2_max_parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: 10,
            argon2_memory_kib: 64 * 1024,
            argon2_iterations: 1,
            argon2_parallelism: 4,
            argon2_output_len: 32,
            argon2_salt_len: 16,
            bcrypt_max_cost: 14,
            argon2_max_memory_kib: 256 * 1024,
            argon2_max_iterations: 16,
            argon2_max_parallelism: 16,
        }
    }
}

/// A parsed Argon2id hash string.
#[derive(Clone, PartialEq, Eq)]
struct Argon2idHash {
    version: u32,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl Argon2idHash {
    fn parse(encoded: &str) -> Result<Self, PasswordError> {
        let parts: Vec<&str> = encoded.split('$').collect();
        if parts.len() != 6 || !parts[0].is_empty() {
            return Err(malformed(format!(
                "expected 6 '$'-delimited fields, got {}",
                parts.len()
            )));
        }
        if parts[1] != "argon2id" {
            return Err(malformed(format!("unsupported argon2 variant: {}", parts[1])));
        }

        let version = parts[2]
            .strip_prefix("v=")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| malformed("invalid version field".to_owned()))?;

        let params: Vec<&str> = parts[3].split(',').collect();
        if params.len() != 3 {
            return Err(malformed("expected m=,t=,p= parameters".to_owned()));
        }
        let memory_kib = parse_param(params[0], "m")?;
        let iterations = parse_param(params[1], "t")?;
        let parallelism = parse_param(params[2], "p")?;

        let salt = STANDARD_NO_PAD
            .decode(parts[4])
            .map_err(|e| malformed(format!("salt is not valid base64: {e}")))?;
        let digest = STANDARD_NO_PAD
            .decode(parts[5])
            .map_err(|e| malformed(format!("digest is not valid base64: {e}")))?;
        if salt.is_empty() || digest.is_empty() {
            return Err(malformed("empty salt or digest".to_owned()));
        }

        Ok(Self {
            version,
            memory_kib,
            iterations,
            parallelism,
            salt,
            digest,
        })
    }

    fn encode(&self) -> String {
        format!(
            "$argon2id$v={}$m={},t={},p={}${}${}",
            self.version,
            self.memory_kib,
            self.iterations,
            self.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.digest),
        )
    }
}

fn parse_param(field: &str, name: &str) -> Result<u32, PasswordError> {
    field
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| malformed(format!("invalid '{name}' parameter")))
}

fn malformed(reason: String) -> PasswordError {
    PasswordError::Malformed { reason }
}

fn argon2_params(
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    output_len: usize,
) -> Result<Params, argon2::Error> {
    Params::new(memory_kib, iterations, parallelism, Some(output_len))
}

/// Derive an Argon2id digest of `out.len()` bytes into `out`.
fn derive_argon2id(
    params: Params,
    version: Version,
    password: &[u8],
    salt: &[u8],
    out: &mut [u8],
) -> Result<(), argon2::Error> {
    Argon2::new(Algorithm::Argon2id, version, params).hash_password_into(password, salt, out)
}

/// Hashes and verifies passwords with a fixed, validated configuration.
///
/// Immutable after construction; safe to share across threads.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    config: HashConfig,
    argon2_params: Params,
}

impl PasswordHasher {
    /// Validate `config` and build a hasher.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError::Configuration`] if the bcrypt cost is outside
    /// `4..=31`, the salt or output length is too short, a cost exceeds its
    /// verification ceiling, or Argon2 rejects the memory/iteration/parallelism
    /// combination.
    pub fn new(config: HashConfig) -> Result<Self, PasswordError> {
        if !(4..=31).contains(&config.bcrypt_cost) {
            return Err(PasswordError::Configuration {
                reason: format!("bcrypt cost must be in 4..=31, got {}", config.bcrypt_cost),
            });
        }
        if config.argon2_salt_len < MIN_SALT_LEN {
            return Err(PasswordError::Configuration {
                reason: format!(
                    "argon2 salt must be at least {MIN_SALT_LEN} bytes, got {}",
                    config.argon2_salt_len
                ),
            });
        }
        if config.argon2_output_len < MIN_OUTPUT_LEN {
            return Err(PasswordError::Configuration {
                reason: format!(
                    "argon2 output must be at least {MIN_OUTPUT_LEN} bytes, got {}",
                    config.argon2_output_len
                ),
            });
        }

        check_ceiling("bcrypt cost", config.bcrypt_cost, config.bcrypt_max_cost)?;
        check_ceiling(
            "argon2 memory",
            config.argon2_memory_kib,
            config.argon2_max_memory_kib,
        )?;
        check_ceiling(
            "argon2 iterations",
            config.argon2_iterations,
            config.argon2_max_iterations,
        )?;
        check_ceiling(
            "argon2 parallelism",
            config.argon2_parallelism,
            config.argon2_max_parallelism,
        )?;

        let argon2_params = argon2_params(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            config.argon2_output_len,
        )
        .map_err(|e| PasswordError::Configuration {
            reason: format!("invalid argon2 parameters: {e}"),
        })?;

        Ok(Self {
            config,
            argon2_params,
        })
    }

    /// The configuration this hasher was built from.
    #[must_use]
    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Hash `password` with `algorithm`.
    ///
    /// # Errors
    ///
    /// - [`PasswordError::InputValidation`] if the password is empty, or
    ///   longer than 72 bytes for bcrypt.
    /// - [`PasswordError::Crypto`] if the primitive fails.
    pub fn hash(&self, password: &str, algorithm: HashAlgorithm) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::InputValidation {
                reason: "password cannot be empty".to_owned(),
            });
        }

        match algorithm {
            HashAlgorithm::Bcrypt => self.hash_bcrypt(password),
            HashAlgorithm::Argon2id => self.hash_argon2id(password),
        }
    }

    /// Check `password` against a stored hash.
    ///
    /// Returns `Ok(false)` on a wrong password.
    ///
    /// # Errors
    ///
    /// - [`PasswordError::InputValidation`] if either input is empty.
    /// - [`PasswordError::Malformed`] if the hash has no recognized layout or
    ///   carries costs above the configured ceilings.
    /// - [`PasswordError::Crypto`] if the primitive fails on a well-formed hash.
    pub fn verify(&self, password: &str, encoded_hash: &str) -> Result<bool, PasswordError> {
        if password.is_empty() || encoded_hash.is_empty() {
            return Err(PasswordError::InputValidation {
                reason: "password and hash cannot be empty".to_owned(),
            });
        }

        let Some(algorithm) = HashAlgorithm::detect(encoded_hash) else {
            warn!("password hash has unrecognized prefix");
            return Err(malformed("unrecognized hash prefix".to_owned()));
        };

        let matched = match algorithm {
            HashAlgorithm::Bcrypt => self.verify_bcrypt(password, encoded_hash),
            HashAlgorithm::Argon2id => self.verify_argon2id(password, encoded_hash),
        }
        .inspect_err(|e| warn!(algorithm = %algorithm, kind = %e.kind(), "password verification error"))?;

        debug!(algorithm = %algorithm, matched, "password verified");
        Ok(matched)
    }

    /// Whether a stored hash should be replaced on the next successful login
    /// because it uses another algorithm or other parameters than this hasher.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError::Malformed`] if the hash cannot be parsed.
    pub fn needs_rehash(
        &self,
        encoded_hash: &str,
        algorithm: HashAlgorithm,
    ) -> Result<bool, PasswordError> {
        let detected = HashAlgorithm::detect(encoded_hash)
            .ok_or_else(|| malformed("unrecognized hash prefix".to_owned()))?;
        if detected != algorithm {
            return Ok(true);
        }

        match algorithm {
            HashAlgorithm::Bcrypt => {
                let cost = encoded_hash
                    .split('$')
                    .nth(2)
                    .and_then(|c| c.parse::<u32>().ok())
                    .ok_or_else(|| malformed("invalid bcrypt cost field".to_owned()))?;
                Ok(cost != self.config.bcrypt_cost)
            }
            HashAlgorithm::Argon2id => {
                let parsed = Argon2idHash::parse(encoded_hash)?;
                Ok(parsed.version != u32::from(Version::V0x13)
                    || parsed.memory_kib != self.config.argon2_memory_kib
                    || parsed.iterations != self.config.argon2_iterations
                    || parsed.parallelism != self.config.argon2_parallelism
                    || parsed.salt.len() != self.config.argon2_salt_len
                    || parsed.digest.len() != self.config.argon2_output_len)
            }
        }
    }

    fn hash_bcrypt(&self, password: &str) -> Result<String, PasswordError> {
        if password.len() > BCRYPT_MAX_PASSWORD_LEN {
            return Err(PasswordError::InputValidation {
                reason: format!("bcrypt passwords are limited to {BCRYPT_MAX_PASSWORD_LEN} bytes"),
            });
        }
        bcrypt::hash(password, self.config.bcrypt_cost).map_err(|e| PasswordError::Crypto {
            reason: format!("bcrypt: {e}"),
        })
    }

    fn hash_argon2id(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = vec![0u8; self.config.argon2_salt_len];
        OsRng.fill_bytes(&mut salt);

        let mut digest = vec![0u8; self.config.argon2_output_len];
        derive_argon2id(
            self.argon2_params.clone(),
            Version::V0x13,
            password.as_bytes(),
            &salt,
            &mut digest,
        )
        .map_err(|e| PasswordError::Crypto {
            reason: format!("argon2id: {e}"),
        })?;

        Ok(Argon2idHash {
            version: Version::V0x13.into(),
            memory_kib: self.config.argon2_memory_kib,
            iterations: self.config.argon2_iterations,
            parallelism: self.config.argon2_parallelism,
            salt,
            digest,
        }
        .encode())
    }

    fn verify_bcrypt(&self, password: &str, encoded_hash: &str) -> Result<bool, PasswordError> {
        // Never hashed by us, so it cannot match a hash we produced.
        if password.len() > BCRYPT_MAX_PASSWORD_LEN {
            return Ok(false);
        }
        // An unreadable cost field is left for bcrypt to report.
        if let Some(cost) = encoded_hash
            .split('$')
            .nth(2)
            .and_then(|c| c.parse::<u32>().ok())
        {
            stored_within("bcrypt cost", cost, self.config.bcrypt_max_cost)?;
        }
        // bcrypt::verify compares in constant time; every error it returns is a
        // structural problem with the stored hash.
        bcrypt::verify(password, encoded_hash).map_err(|e| malformed(format!("bcrypt: {e}")))
    }

    fn verify_argon2id(&self, password: &str, encoded_hash: &str) -> Result<bool, PasswordError> {
        let stored = Argon2idHash::parse(encoded_hash)?;
        if stored.salt.len() < MIN_SALT_LEN {
            return Err(malformed(format!("salt shorter than {MIN_SALT_LEN} bytes")));
        }
        stored_within(
            "argon2 memory",
            stored.memory_kib,
            self.config.argon2_max_memory_kib,
        )?;
        stored_within(
            "argon2 iterations",
            stored.iterations,
            self.config.argon2_max_iterations,
        )?;
        stored_within(
            "argon2 parallelism",
            stored.parallelism,
            self.config.argon2_max_parallelism,
        )?;

        let version = Version::try_from(stored.version)
            .map_err(|_| malformed(format!("unsupported argon2 version {}", stored.version)))?;
        let params = argon2_params(
            stored.memory_kib,
            stored.iterations,
            stored.parallelism,
            stored.digest.len(),
        )
        .map_err(|e| malformed(format!("invalid stored parameters: {e}")))?;

        let mut computed = Zeroizing::new(vec![0u8; stored.digest.len()]);
        derive_argon2id(
            params,
            version,
            password.as_bytes(),
            &stored.salt,
            &mut computed,
        )
        .map_err(|e| PasswordError::Crypto {
            reason: format!("argon2id: {e}"),
        })?;

        Ok(computed.as_slice().ct_eq(stored.digest.as_slice()).into())
    }
}

fn check_ceiling(name: &str, value: u32, ceiling: u32) -> Result<(), PasswordError> {
    if value > ceiling {
        return Err(PasswordError::Configuration {
            reason: format!("{name} {value} exceeds the configured ceiling {ceiling}"),
        });
    }
    Ok(())
}

/// A stored cost above its ceiling is rejected before any hashing work.
fn stored_within(name: &str, value: u32, ceiling: u32) -> Result<(), PasswordError> {
    if value > ceiling {
        return Err(malformed(format!("stored {name} {value} exceeds ceiling {ceiling}")));
    }
    Ok(())
}
