//! Error types for `credvault-core`.
//!
//! Each component has its own error enum. Every variant reports an
//! [`ErrorKind`] so outer layers can map errors without matching on
//! component-specific variants. Error messages never include passwords,
//! tokens, or key material.

use std::fmt;

use crate::token::TokenType;

/// Classification shared by every error in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty, oversized, or undersized input rejected before any crypto work.
    InputValidation,
    /// Structurally unparseable hash, token, or envelope.
    Malformed,
    /// Invalid algorithm or key setup, detected at construction.
    Configuration,
    /// An underlying primitive could not be built or run.
    CryptoFailure,
    /// Password, signature, or tag mismatch.
    AuthenticationFailure,
    /// The token's `exp` has passed.
    Expired,
    /// The token's `nbf` is still in the future.
    NotYetValid,
    /// The token was issued by someone else.
    IssuerMismatch,
    /// The token was issued for someone else.
    AudienceMismatch,
}

impl ErrorKind {
    /// Whether this kind must be indistinguishable from a failed login for
    /// untrusted callers.
    #[must_use]
    pub fn is_authentication_failure(self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure
                | Self::Expired
                | Self::NotYetValid
                | Self::IssuerMismatch
                | Self::AudienceMismatch
        )
    }

    /// The only message that may be shown to an untrusted caller.
    ///
    /// Authentication-class outcomes and malformed credentials collapse to a
    /// single generic rejection so responses cannot be used as an oracle.
    #[must_use]
    pub fn public_message(self) -> &'static str {
        match self {
            Self::AuthenticationFailure
            | Self::Expired
            | Self::NotYetValid
            | Self::IssuerMismatch
            | Self::AudienceMismatch
            | Self::Malformed => "invalid credentials",
            Self::InputValidation => "invalid request",
            Self::Configuration | Self::CryptoFailure => "internal error",
        }
    }

    /// Stable snake_case name, used as a structured log field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "input_validation",
            Self::Malformed => "malformed",
            Self::Configuration => "configuration",
            Self::CryptoFailure => "crypto_failure",
            Self::AuthenticationFailure => "authentication_failure",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from password hashing and verification.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Empty or oversized password, or empty hash.
    #[error("invalid password input: {reason}")]
    InputValidation { reason: String },

    /// The stored hash does not match any recognized layout.
    #[error("malformed password hash: {reason}")]
    Malformed { reason: String },

    /// The hashing configuration is unusable.
    #[error("invalid hash config: {reason}")]
    Configuration { reason: String },

    /// The hashing primitive failed.
    #[error("password hashing failed: {reason}")]
    Crypto { reason: String },
}

impl PasswordError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Crypto { .. } => ErrorKind::CryptoFailure,
        }
    }
}

/// Errors from token issuance and verification.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Empty token or otherwise unusable input.
    #[error("invalid token input: {reason}")]
    InputValidation { reason: String },

    /// The token is not a well-formed three-segment JWT.
    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    /// Missing or mismatched keys, unsupported TTLs.
    #[error("invalid token config: {reason}")]
    Configuration { reason: String },

    /// Signing failed.
    #[error("token signing failed: {reason}")]
    Crypto { reason: String },

    /// The token header declares an algorithm other than the configured one.
    #[error("token algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    /// The signature does not verify under the configured key.
    #[error("token signature is invalid")]
    BadSignature,

    /// `iss` differs from the configured issuer.
    #[error("token issuer mismatch")]
    IssuerMismatch,

    /// `aud` does not contain the configured audience.
    #[error("token audience mismatch")]
    AudienceMismatch,

    /// `nbf` is in the future.
    #[error("token not valid before {not_before}")]
    NotYetValid { not_before: i64 },

    /// `exp` has passed.
    #[error("token expired at {expired_at}")]
    Expired { expired_at: i64 },

    /// A token of the wrong type was presented (e.g. an access token to refresh).
    #[error("expected a {expected} token")]
    WrongTokenType { expected: TokenType },
}

impl TokenError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Crypto { .. } => ErrorKind::CryptoFailure,
            Self::AlgorithmMismatch { .. } | Self::BadSignature | Self::WrongTokenType { .. } => {
                ErrorKind::AuthenticationFailure
            }
            Self::IssuerMismatch => ErrorKind::IssuerMismatch,
            Self::AudienceMismatch => ErrorKind::AudienceMismatch,
            Self::NotYetValid { .. } => ErrorKind::NotYetValid,
            Self::Expired { .. } => ErrorKind::Expired,
        }
    }
}

/// Errors from symmetric encryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Empty plaintext or envelope.
    #[error("invalid cipher input: {reason}")]
    InputValidation { reason: String },

    /// The envelope is too short, carries an unknown version, or is not base64.
    #[error("malformed ciphertext: {reason}")]
    Malformed { reason: String },

    /// Unsupported key size.
    #[error("invalid key: {reason}")]
    Configuration { reason: String },

    /// The AEAD primitive could not be built or failed to seal.
    #[error("cipher failure: {reason}")]
    Crypto { reason: String },

    /// Tag mismatch, corrupted ciphertext, or wrong key. Deliberately opaque.
    #[error("decryption failed")]
    AuthenticationFailure,
}

impl CipherError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Crypto { .. } => ErrorKind::CryptoFailure,
            Self::AuthenticationFailure => ErrorKind::AuthenticationFailure,
        }
    }
}

/// Umbrella error for callers that handle all three components in one place.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Password(e) => e.kind(),
            Self::Token(e) => e.kind(),
            Self::Cipher(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_kinds_collapse_to_one_message() {
        let kinds = [
            ErrorKind::AuthenticationFailure,
            ErrorKind::Expired,
            ErrorKind::NotYetValid,
            ErrorKind::IssuerMismatch,
            ErrorKind::AudienceMismatch,
        ];
        for kind in kinds {
            assert!(kind.is_authentication_failure());
            assert_eq!(kind.public_message(), "invalid credentials");
        }
        assert_eq!(ErrorKind::Malformed.public_message(), "invalid credentials");
        assert!(!ErrorKind::Malformed.is_authentication_failure());
    }

    #[test]
    fn internal_kinds_do_not_leak_detail() {
        assert_eq!(ErrorKind::Configuration.public_message(), "internal error");
        assert_eq!(ErrorKind::CryptoFailure.public_message(), "internal error");
        assert_eq!(ErrorKind::InputValidation.public_message(), "invalid request");
    }

    #[test]
    fn token_signature_errors_are_authentication_failures() {
        assert_eq!(
            TokenError::BadSignature.kind(),
            ErrorKind::AuthenticationFailure
        );
        let mismatch = TokenError::AlgorithmMismatch {
            expected: "HS256".to_owned(),
            actual: "HS512".to_owned(),
        };
        assert_eq!(mismatch.kind(), ErrorKind::AuthenticationFailure);
        assert_eq!(
            TokenError::Expired { expired_at: 0 }.kind(),
            ErrorKind::Expired
        );
    }

    #[test]
    fn umbrella_error_preserves_kind() {
        let err: Error = CipherError::AuthenticationFailure.into();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
        assert_eq!(err.to_string(), "decryption failed");

        let err: Error = PasswordError::Malformed {
            reason: "bad".to_owned(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }
}
