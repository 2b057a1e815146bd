//! CLI configuration for `credvault`.
//!
//! Starts from an optional JSON file and applies `CREDVAULT_*` environment
//! variables on top. Command-line flags override both.

use std::env;
use std::fmt::Display;
use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use credvault_core::{CredvaultConfig, SigningKeys, TokenAlgorithm};

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Log filter (e.g. `info`, `debug`, `warn`).
    pub log_level: String,
    /// Settings handed to the core services.
    pub credvault: CredvaultConfig,
    /// Base64 AES key for `encrypt` / `decrypt`.
    pub encryption_key: Option<String>,
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CREDVAULT_CONFIG`: JSON file with `password`, `token`, `cipher` sections (optional)
    /// - `CREDVAULT_LOG_LEVEL`: log filter (default: `info`, `RUST_LOG` wins if set)
    /// - `CREDVAULT_BCRYPT_COST`: bcrypt cost factor (default: `10`)
    /// - `CREDVAULT_ARGON2_MEMORY_KIB`: Argon2 memory in KiB (default: `65536`)
    /// - `CREDVAULT_ARGON2_ITERATIONS`: Argon2 passes (default: `1`)
    /// - `CREDVAULT_ARGON2_PARALLELISM`: Argon2 lanes (default: `4`)
    /// - `CREDVAULT_TOKEN_ALGORITHM`: `HS256`..`HS512`, `RS256`..`RS512` (default: `HS256`)
    /// - `CREDVAULT_TOKEN_SECRET`: HMAC secret
    /// - `CREDVAULT_RSA_PRIVATE_KEY_PATH` / `CREDVAULT_RSA_PUBLIC_KEY_PATH`: PEM files
    /// - `CREDVAULT_TOKEN_ISSUER`: `iss` claim (default: `credvault`)
    /// - `CREDVAULT_TOKEN_AUDIENCE`: `aud` claim (default: `credvault-api`)
    /// - `CREDVAULT_ACCESS_TTL_SECS`: access token lifetime (default: `900`)
    /// - `CREDVAULT_REFRESH_TTL_SECS`: refresh token lifetime (default: `604800`)
    /// - `CREDVAULT_TOKEN_LEEWAY_SECS`: tolerated clock skew (default: `0`)
    /// - `CREDVAULT_ENCRYPTION_KEY`: base64 AES key (optional)
    ///
    /// # Errors
    ///
    /// Fails if the config file or a PEM file cannot be read, or a variable
    /// holds a value of the wrong type.
    pub fn from_env() -> Result<Self> {
        let mut credvault = match env::var("CREDVAULT_CONFIG") {
            Ok(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                CredvaultConfig::from_json_str(&raw)
                    .with_context(|| format!("invalid config file {path}"))?
            }
            Err(_) => CredvaultConfig::default(),
        };

        let log_level = env::var("CREDVAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let password = &mut credvault.password;
        if let Some(cost) = parse_var("CREDVAULT_BCRYPT_COST")? {
            password.bcrypt_cost = cost;
        }
        if let Some(memory) = parse_var("CREDVAULT_ARGON2_MEMORY_KIB")? {
            password.argon2_memory_kib = memory;
        }
        if let Some(iterations) = parse_var("CREDVAULT_ARGON2_ITERATIONS")? {
            password.argon2_iterations = iterations;
        }
        if let Some(parallelism) = parse_var("CREDVAULT_ARGON2_PARALLELISM")? {
            password.argon2_parallelism = parallelism;
        }

        let token = &mut credvault.token;
        if let Some(algorithm) = parse_var::<TokenAlgorithm>("CREDVAULT_TOKEN_ALGORITHM")? {
            token.algorithm = algorithm;
        }
        if let Ok(issuer) = env::var("CREDVAULT_TOKEN_ISSUER") {
            token.issuer = issuer;
        }
        if let Ok(audience) = env::var("CREDVAULT_TOKEN_AUDIENCE") {
            token.audience = audience;
        }
        if let Some(ttl) = parse_var("CREDVAULT_ACCESS_TTL_SECS")? {
            token.access_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_var("CREDVAULT_REFRESH_TTL_SECS")? {
            token.refresh_ttl_secs = ttl;
        }
        if let Some(leeway) = parse_var("CREDVAULT_TOKEN_LEEWAY_SECS")? {
            token.leeway_secs = leeway;
        }

        let private_path = env::var("CREDVAULT_RSA_PRIVATE_KEY_PATH").ok();
        let public_path = env::var("CREDVAULT_RSA_PUBLIC_KEY_PATH").ok();
        if private_path.is_some() || public_path.is_some() {
            // A missing half stays empty and is reported by the token manager.
            token.keys = SigningKeys::rsa(
                read_pem(private_path.as_deref())?,
                read_pem(public_path.as_deref())?,
            );
        } else if let Ok(secret) = env::var("CREDVAULT_TOKEN_SECRET") {
            token.keys = SigningKeys::hmac(secret);
        }

        let encryption_key = env::var("CREDVAULT_ENCRYPTION_KEY").ok();

        Ok(Self {
            log_level,
            credvault,
            encryption_key,
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}

fn read_pem(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read PEM file {path}"))
        }
        None => Ok(String::new()),
    }
}
