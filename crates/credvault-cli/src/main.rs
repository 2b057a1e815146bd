//! `credvault` CLI: operator access to the credential services.
//!
//! Hashes and verifies passwords, generates AES keys, seals and opens
//! secrets, and issues, inspects, and refreshes tokens. Results go to
//! stdout; structured logs and errors go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;

use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

use credvault_core::{
    Claims, EncryptionKey, HashAlgorithm, PasswordHasher, SymmetricCipher, TokenAlgorithm,
    TokenManager, TokenType,
};

use crate::config::CliConfig;

// ── CLI structure ────────────────────────────────────────────────────

/// credvault: password hashing, signed tokens, and secret encryption.
#[derive(Parser)]
#[command(
    name = "credvault",
    version,
    about = "credvault CLI: hash passwords, issue and inspect tokens, seal secrets",
    long_about = None,
    after_help = "Environment variables:\n  \
         CREDVAULT_CONFIG          JSON config file\n  \
         CREDVAULT_TOKEN_SECRET    HMAC signing secret\n  \
         CREDVAULT_ENCRYPTION_KEY  Base64 AES key\n  \
         CREDVAULT_LOG_LEVEL       Log filter (default: info)\n\n\
         Examples:\n  \
         credvault hash --algorithm argon2id --password 'hunter2'\n  \
         credvault keygen --bits 256\n  \
         credvault token issue --user-id 42 --role admin"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password (read from stdin when --password is omitted).
    Hash {
        #[arg(long, default_value = "argon2id")]
        algorithm: HashAlgorithm,
        #[arg(long)]
        password: Option<String>,
    },
    /// Check a password against a stored hash. Exits non-zero on mismatch.
    Verify {
        /// Stored hash.
        #[arg(long)]
        hash: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Report whether a stored hash uses outdated parameters.
    NeedsRehash {
        #[arg(long)]
        hash: String,
        #[arg(long, default_value = "argon2id")]
        algorithm: HashAlgorithm,
    },
    /// Generate a random AES key and print it as base64.
    Keygen {
        /// Key size: 128, 192, or 256 (default from config: 256).
        #[arg(long)]
        bits: Option<u32>,
    },
    /// Encrypt text (read from stdin when omitted) and print the base64 envelope.
    Encrypt {
        /// Base64 key (overrides `CREDVAULT_ENCRYPTION_KEY`).
        #[arg(long)]
        key: Option<String>,
        plaintext: Option<String>,
    },
    /// Decrypt a base64 envelope and print the plaintext.
    Decrypt {
        /// Base64 key (overrides `CREDVAULT_ENCRYPTION_KEY`).
        #[arg(long)]
        key: Option<String>,
        ciphertext: String,
    },
    /// Token operations.
    Token {
        /// Signing algorithm (overrides `CREDVAULT_TOKEN_ALGORITHM`).
        #[arg(long, global = true)]
        algorithm: Option<TokenAlgorithm>,
        #[command(subcommand)]
        action: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a token for a user.
    Issue {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Role to grant; repeat for several.
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Custom claim as key=value; the value is parsed as JSON when possible.
        #[arg(long = "claim", value_parser = parse_custom_claim)]
        custom: Vec<(String, Value)>,
        #[arg(long = "type", value_enum, default_value = "access")]
        kind: IssueKind,
    },
    /// Verify a token and print its claims as JSON.
    Parse { token: String },
    /// Exchange a refresh token for a new access token.
    Refresh { token: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum IssueKind {
    Access,
    Refresh,
    /// Access and refresh tokens as a JSON object.
    Pair,
}

// ── Entry point ──────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cmd: Commands) -> Result<()> {
    let config = CliConfig::from_env()?;
    init_tracing(&config.log_level);

    match cmd {
        Commands::Hash {
            algorithm,
            password,
        } => cmd_hash(&config, algorithm, password),
        Commands::Verify { hash, password } => cmd_verify(&config, &hash, password),
        Commands::NeedsRehash { hash, algorithm } => cmd_needs_rehash(&config, &hash, algorithm),
        Commands::Keygen { bits } => cmd_keygen(&config, bits),
        Commands::Encrypt { key, plaintext } => cmd_encrypt(&config, key, plaintext),
        Commands::Decrypt { key, ciphertext } => cmd_decrypt(&config, key, &ciphertext),
        Commands::Token { algorithm, action } => cmd_token(&config, algorithm, action),
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .json()
        .init();
}

// ── Passwords ────────────────────────────────────────────────────────

fn hasher(config: &CliConfig) -> Result<PasswordHasher> {
    PasswordHasher::new(config.credvault.password.clone()).context("invalid password settings")
}

fn cmd_hash(config: &CliConfig, algorithm: HashAlgorithm, password: Option<String>) -> Result<()> {
    let password = password_or_stdin(password)?;
    let hash = hasher(config)?.hash(&password, algorithm)?;
    println!("{hash}");
    Ok(())
}

fn cmd_verify(config: &CliConfig, hash: &str, password: Option<String>) -> Result<()> {
    let password = password_or_stdin(password)?;
    if !hasher(config)?.verify(&password, hash)? {
        bail!("password does not match");
    }
    println!("ok");
    Ok(())
}

fn cmd_needs_rehash(config: &CliConfig, hash: &str, algorithm: HashAlgorithm) -> Result<()> {
    let stale = hasher(config)?.needs_rehash(hash, algorithm)?;
    println!("{stale}");
    Ok(())
}

fn password_or_stdin(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => read_stdin_line().context("failed to read password from stdin"),
    }
}

fn read_stdin_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_owned())
}

// ── Cipher ───────────────────────────────────────────────────────────

fn cmd_keygen(config: &CliConfig, bits: Option<u32>) -> Result<()> {
    let bits = bits.unwrap_or_else(|| config.credvault.cipher.key_size.bits());
    let key = EncryptionKey::generate(bits)?;
    info!(bits, "generated encryption key");
    println!("{}", key.to_base64());
    Ok(())
}

fn cipher(config: &CliConfig, key: Option<String>) -> Result<SymmetricCipher> {
    let encoded = key
        .or_else(|| config.encryption_key.clone())
        .context("no encryption key: pass --key or set CREDVAULT_ENCRYPTION_KEY")?;
    let key = EncryptionKey::from_base64(&encoded).context("invalid encryption key")?;
    Ok(SymmetricCipher::new(key))
}

fn cmd_encrypt(config: &CliConfig, key: Option<String>, plaintext: Option<String>) -> Result<()> {
    let plaintext = match plaintext {
        Some(text) => text,
        None => read_stdin_line().context("failed to read plaintext from stdin")?,
    };
    let sealed = cipher(config, key)?.encrypt_string(&plaintext)?;
    println!("{sealed}");
    Ok(())
}

fn cmd_decrypt(config: &CliConfig, key: Option<String>, ciphertext: &str) -> Result<()> {
    let plaintext = cipher(config, key)?.decrypt_string(ciphertext.trim())?;
    println!("{plaintext}");
    Ok(())
}

// ── Tokens ───────────────────────────────────────────────────────────

fn cmd_token(
    config: &CliConfig,
    algorithm: Option<TokenAlgorithm>,
    action: TokenCommands,
) -> Result<()> {
    let mut token_config = config.credvault.token.clone();
    if let Some(algorithm) = algorithm {
        token_config.algorithm = algorithm;
    }
    let manager = TokenManager::new(token_config).context("invalid token settings")?;

    match action {
        TokenCommands::Issue {
            user_id,
            username,
            email,
            roles,
            custom,
            kind,
        } => {
            let mut claims = Claims::for_user(user_id).with_roles(roles);
            if let Some(username) = username {
                claims = claims.with_username(username);
            }
            if let Some(email) = email {
                claims = claims.with_email(email);
            }
            for (key, value) in custom {
                claims = claims.with_custom(key, value);
            }

            match kind {
                IssueKind::Access => {
                    println!("{}", manager.generate_token(&claims, TokenType::Access)?);
                }
                IssueKind::Refresh => {
                    println!("{}", manager.generate_token(&claims, TokenType::Refresh)?);
                }
                IssueKind::Pair => {
                    let pair = manager.generate_token_pair(&claims)?;
                    println!("{}", serde_json::to_string_pretty(&pair)?);
                }
            }
        }
        TokenCommands::Parse { token } => {
            let claims = manager.parse_token(token.trim())?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        TokenCommands::Refresh { token } => {
            println!("{}", manager.refresh_token(token.trim())?);
        }
    }
    Ok(())
}

fn parse_custom_claim(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err("claim key cannot be empty".to_owned());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}
