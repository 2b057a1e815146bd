//! Signed claims tokens (JWT) for access and refresh flows.
//!
//! Tokens are stateless: nothing is stored server-side, so a token is only
//! ever invalidated by its expiry. Two algorithm families are supported,
//! HMAC with a shared secret and RSA with a separately supplied keypair.
//!
//! # Security model
//!
//! - The verification algorithm and key come from the manager's
//!   configuration. A token whose header declares any other algorithm is
//!   rejected before its signature is looked at.
//! - Issuer, audience, `nbf` and `exp` are checked here, against the
//!   manager's [`Clock`], not delegated to the JWT library.
//! - `exp` is exclusive: a token is expired from the second it names.
//! - Key material is validated once, at construction. RSA keypairs are
//!   checked to belong together by signing and verifying a probe.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// HMAC secrets shorter than this are accepted but logged.
const RECOMMENDED_HMAC_SECRET_LEN: usize = 32;

/// Largest TTL or leeway accepted, in seconds (the range of `chrono::Duration`).
const MAX_DURATION_SECS: i64 = i64::MAX / 1000;

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
    Rs256,
    Rs384,
    Rs512,
}

/// Which kind of key an algorithm needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmac => f.write_str("HMAC"),
            Self::Rsa => f.write_str("RSA"),
        }
    }
}

impl TokenAlgorithm {
    /// Key material this algorithm signs with.
    #[must_use]
    pub fn family(self) -> KeyFamily {
        match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => KeyFamily::Hmac,
            Self::Rs256 | Self::Rs384 | Self::Rs512 => KeyFamily::Rsa,
        }
    }

    /// JOSE `alg` header value, e.g. `"HS256"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
        }
    }
}

impl From<TokenAlgorithm> for Algorithm {
    fn from(alg: TokenAlgorithm) -> Self {
        match alg {
            TokenAlgorithm::Hs256 => Self::HS256,
            TokenAlgorithm::Hs384 => Self::HS384,
            TokenAlgorithm::Hs512 => Self::HS512,
            TokenAlgorithm::Rs256 => Self::RS256,
            TokenAlgorithm::Rs384 => Self::RS384,
            TokenAlgorithm::Rs512 => Self::RS512,
        }
    }
}

impl fmt::Display for TokenAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            other => Err(TokenError::Configuration {
                reason: format!("unsupported token algorithm: {other}"),
            }),
        }
    }
}

/// Access tokens authorize requests; refresh tokens mint new access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Key material for signing and verification.
///
/// Zeroized on drop; never printed by `Debug`.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SigningKeys {
    /// Shared secret for HS256/384/512.
    Hmac { secret: String },
    /// PEM-encoded keypair for RS256/384/512. Both halves are required.
    Rsa {
        private_pem: String,
        public_pem: String,
    },
}

impl SigningKeys {
    /// HMAC shared secret.
    #[must_use]
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self::Hmac {
            secret: secret.into(),
        }
    }

    /// RSA keypair as PEM text.
    #[must_use]
    pub fn rsa(private_pem: impl Into<String>, public_pem: impl Into<String>) -> Self {
        Self::Rsa {
            private_pem: private_pem.into(),
            public_pem: public_pem.into(),
        }
    }

    /// Which algorithm family this material can serve.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Hmac { .. } => KeyFamily::Hmac,
            Self::Rsa { .. } => KeyFamily::Rsa,
        }
    }
}

impl Default for SigningKeys {
    fn default() -> Self {
        Self::hmac(String::new())
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("family", &self.family())
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Token manager configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub algorithm: TokenAlgorithm,
    pub keys: SigningKeys,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Clock skew tolerated on `nbf` and `exp`.
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            algorithm: TokenAlgorithm::Hs256,
            keys: SigningKeys::default(),
            issuer: "credvault".to_owned(),
            audience: "credvault-api".to_owned(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 0,
        }
    }
}

/// Registered claims plus the caller's identity fields.
///
/// Callers fill in the identity part; [`TokenManager::generate_token`]
/// stamps the registered part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aud: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

impl Claims {
    /// Claims identifying `user_id`, which is also used as the subject.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            sub: Some(user_id.clone()),
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.sub = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Only the identity fields: subject, user id, username, email, roles,
    /// and the custom map. Registered and temporal claims are dropped.
    #[must_use]
    pub fn identity(&self) -> Self {
        Self {
            sub: self.sub.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            custom: self.custom.clone(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|t| DateTime::from_timestamp(t, 0))
    }

    #[must_use]
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.nbf.and_then(|t| DateTime::from_timestamp(t, 0))
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|t| DateTime::from_timestamp(t, 0))
    }
}

/// `aud` may be a single string or an array.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

/// An access token and a refresh token minted from the same claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies tokens under one algorithm, key, issuer, and audience.
///
/// Immutable after construction; safe to share across threads.
pub struct TokenManager {
    algorithm: TokenAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: i64,
    refresh_ttl: i64,
    leeway: i64,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    /// Build a manager that reads wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Configuration`] if the keys do not fit the
    /// algorithm, a secret or PEM is missing or unparseable, the RSA halves
    /// are identical or do not belong together, the issuer or audience is
    /// empty, or a TTL is out of range.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a manager with an explicit time source.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::new`].
    pub fn with_clock(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        if config.issuer.is_empty() {
            return Err(configuration("issuer cannot be empty".to_owned()));
        }
        if config.audience.is_empty() {
            return Err(configuration("audience cannot be empty".to_owned()));
        }

        let (encoding_key, decoding_key) = build_keys(config.algorithm, &config.keys)?;

        let mut validation = Validation::new(config.algorithm.into());
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let manager = Self {
            algorithm: config.algorithm,
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_ttl: secs_to_i64(config.access_ttl_secs, "access_ttl_secs")?,
            refresh_ttl: secs_to_i64(config.refresh_ttl_secs, "refresh_ttl_secs")?,
            leeway: secs_to_i64(config.leeway_secs, "leeway_secs")?,
            clock,
        };

        if config.algorithm.family() == KeyFamily::Rsa {
            manager.check_keypair()?;
        }

        Ok(manager)
    }

    /// The pinned signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> TokenAlgorithm {
        self.algorithm
    }

    /// Expected and emitted `iss`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected and emitted `aud`.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Lifetime of tokens of the given type.
    #[must_use]
    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => Duration::seconds(self.access_ttl),
            TokenType::Refresh => Duration::seconds(self.refresh_ttl),
        }
    }

    /// Sign a new token carrying `claims`.
    ///
    /// `iss`, `aud`, `iat`, `nbf`, `exp`, `jti`, and `token_type` are
    /// overwritten; `claims` itself is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Crypto`] if signing fails.
    pub fn generate_token(
        &self,
        claims: &Claims,
        token_type: TokenType,
    ) -> Result<String, TokenError> {
        let now = self.clock.now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let mut stamped = claims.clone();
        stamped.iss = Some(self.issuer.clone());
        stamped.aud = vec![self.audience.clone()];
        stamped.iat = Some(now);
        stamped.nbf = Some(now);
        stamped.exp = Some(now.saturating_add(ttl));
        stamped.jti = Some(Uuid::new_v4().to_string());
        stamped.token_type = Some(token_type);

        let header = Header::new(self.algorithm.into());
        let token = jsonwebtoken::encode(&header, &stamped, &self.encoding_key).map_err(|e| {
            TokenError::Crypto {
                reason: format!("failed to sign token: {e}"),
            }
        })?;

        debug!(algorithm = %self.algorithm, %token_type, "token issued");
        Ok(token)
    }

    /// Issue an access token and a refresh token from the same claims.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::generate_token`].
    pub fn generate_token_pair(&self, claims: &Claims) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.generate_token(claims, TokenType::Access)?,
            refresh_token: self.generate_token(claims, TokenType::Refresh)?,
        })
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// - [`TokenError::InputValidation`] if the token is empty.
    /// - [`TokenError::Malformed`] if it is not a decodable three-segment JWT.
    /// - [`TokenError::AlgorithmMismatch`] if the header names another algorithm.
    /// - [`TokenError::BadSignature`] if the signature does not verify.
    /// - [`TokenError::IssuerMismatch`] / [`TokenError::AudienceMismatch`].
    /// - [`TokenError::NotYetValid`] / [`TokenError::Expired`].
    pub fn parse_token(&self, token: &str) -> Result<Claims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::InputValidation {
                reason: "token cannot be empty".to_owned(),
            });
        }

        self.verify(token)
            .inspect_err(|e| warn!(kind = %e.kind(), error = %e, "token rejected"))
    }

    /// Verify `token`, discarding its claims.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::parse_token`].
    pub fn validate_token(&self, token: &str) -> Result<(), TokenError> {
        self.parse_token(token).map(|_| ())
    }

    /// Exchange a valid refresh token for a new access token.
    ///
    /// Only identity fields are carried over; the new token gets fresh
    /// temporal claims.
    ///
    /// # Errors
    ///
    /// Any [`TokenManager::parse_token`] error, or
    /// [`TokenError::WrongTokenType`] if the token is not a refresh token.
    pub fn refresh_token(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.parse_token(refresh_token)?;
        if claims.token_type != Some(TokenType::Refresh) {
            warn!("refresh attempted with a non-refresh token");
            return Err(TokenError::WrongTokenType {
                expected: TokenType::Refresh,
            });
        }
        self.generate_token(&claims.identity(), TokenType::Access)
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(malformed("expected three dot-separated segments".to_owned()));
        }

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| malformed(format!("invalid header: {e}")))?;
        let expected: Algorithm = self.algorithm.into();
        if header.alg != expected {
            return Err(TokenError::AlgorithmMismatch {
                expected: self.algorithm.to_string(),
                actual: format!("{:?}", header.alg),
            });
        }

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(map_decode_error)?
            .claims;

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(TokenError::IssuerMismatch);
        }
        if !claims.aud.iter().any(|aud| *aud == self.audience) {
            return Err(TokenError::AudienceMismatch);
        }

        let now = self.clock.now().timestamp();
        if let Some(nbf) = claims.nbf {
            if now.saturating_add(self.leeway) < nbf {
                return Err(TokenError::NotYetValid { not_before: nbf });
            }
        }
        let Some(exp) = claims.exp else {
            return Err(malformed("missing exp claim".to_owned()));
        };
        if now.saturating_sub(self.leeway) >= exp {
            return Err(TokenError::Expired { expired_at: exp });
        }

        Ok(claims)
    }

    /// Sign a probe with the private key and verify it with the public key.
    fn check_keypair(&self) -> Result<(), TokenError> {
        let probe = serde_json::json!({ "iss": self.issuer, "probe": true });
        let header = Header::new(self.algorithm.into());
        let signed = jsonwebtoken::encode(&header, &probe, &self.encoding_key)
            .map_err(|e| configuration(format!("RSA private key cannot sign: {e}")))?;
        jsonwebtoken::decode::<Value>(&signed, &self.decoding_key, &self.validation)
            .map_err(|_| configuration("RSA public key does not match private key".to_owned()))?;
        Ok(())
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

fn build_keys(
    algorithm: TokenAlgorithm,
    keys: &SigningKeys,
) -> Result<(EncodingKey, DecodingKey), TokenError> {
    match keys {
        SigningKeys::Hmac { secret } if algorithm.family() == KeyFamily::Hmac => {
            if secret.is_empty() {
                return Err(configuration(
                    "secret is required for HMAC algorithms".to_owned(),
                ));
            }
            if secret.len() < RECOMMENDED_HMAC_SECRET_LEN {
                warn!(
                    len = secret.len(),
                    recommended = RECOMMENDED_HMAC_SECRET_LEN,
                    "HMAC secret is shorter than recommended"
                );
            }
            Ok((
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            ))
        }
        SigningKeys::Rsa {
            private_pem,
            public_pem,
        } if algorithm.family() == KeyFamily::Rsa => {
            if private_pem.trim().is_empty() {
                return Err(configuration(
                    "private key is required for RSA algorithms".to_owned(),
                ));
            }
            if public_pem.trim().is_empty() {
                return Err(configuration(
                    "public key is required for RSA algorithms".to_owned(),
                ));
            }
            if private_pem.trim() == public_pem.trim() {
                return Err(configuration(
                    "RSA private and public keys must be supplied separately".to_owned(),
                ));
            }
            let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| configuration(format!("failed to parse RSA private key: {e}")))?;
            let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| configuration(format!("failed to parse RSA public key: {e}")))?;
            Ok((encoding, decoding))
        }
        other => Err(configuration(format!(
            "{algorithm} requires {} keys, got {} keys",
            algorithm.family(),
            other.family()
        ))),
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => {
            TokenError::BadSignature
        }
        _ => malformed(err.to_string()),
    }
}

fn secs_to_i64(secs: u64, field: &str) -> Result<i64, TokenError> {
    i64::try_from(secs)
        .ok()
        .filter(|secs| *secs <= MAX_DURATION_SECS)
        .ok_or_else(|| configuration(format!("{field} is out of range")))
}

fn malformed(reason: String) -> TokenError {
    TokenError::Malformed { reason }
}

fn configuration(reason: String) -> TokenError {
    TokenError::Configuration { reason }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const T0: i64 = 1_700_000_000;

    fn config() -> TokenConfig {
        TokenConfig {
            keys: SigningKeys::hmac(SECRET),
            issuer: "svc".to_owned(),
            audience: "svc-api".to_owned(),
            ..TokenConfig::default()
        }
    }

    fn manager_at(config: TokenConfig, ts: i64) -> TokenManager {
        TokenManager::with_clock(config, Arc::new(FixedClock::at_timestamp(ts))).unwrap()
    }

    fn claims() -> Claims {
        Claims::for_user("user-42")
            .with_username("ada")
            .with_email("ada@example.com")
            .with_roles(["admin", "ops"])
            .with_custom("tenant", "acme")
    }

    #[test]
    fn generate_then_parse_roundtrip() {
        let manager = manager_at(config(), T0);
        let token = manager.generate_token(&claims(), TokenType::Access).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let parsed = manager.parse_token(&token).unwrap();
        assert_eq!(parsed.user_id.as_deref(), Some("user-42"));
        assert_eq!(parsed.username.as_deref(), Some("ada"));
        assert_eq!(parsed.roles, vec!["admin", "ops"]);
        assert_eq!(parsed.custom.get("tenant"), Some(&Value::from("acme")));
        assert_eq!(parsed.iss.as_deref(), Some("svc"));
        assert_eq!(parsed.aud, vec!["svc-api"]);
        assert_eq!(parsed.iat, Some(T0));
        assert_eq!(parsed.nbf, Some(T0));
        assert_eq!(parsed.exp, Some(T0 + 15 * 60));
        assert_eq!(parsed.token_type, Some(TokenType::Access));
        assert!(parsed.jti.is_some());
    }

    #[test]
    fn generate_does_not_mutate_input_claims() {
        let manager = manager_at(config(), T0);
        let original = claims();
        manager.generate_token(&original, TokenType::Access).unwrap();
        assert_eq!(original, claims());
    }

    #[test]
    fn refresh_ttl_applies_to_refresh_tokens() {
        let manager = manager_at(config(), T0);
        let token = manager.generate_token(&claims(), TokenType::Refresh).unwrap();
        let parsed = manager.parse_token(&token).unwrap();
        assert_eq!(parsed.exp, Some(T0 + 7 * 24 * 60 * 60));
        assert_eq!(parsed.token_type, Some(TokenType::Refresh));
        assert_eq!(manager.ttl(TokenType::Refresh), Duration::days(7));
        assert_eq!(manager.ttl(TokenType::Access), Duration::minutes(15));
    }

    #[test]
    fn expiry_is_exclusive() {
        let token = manager_at(config(), T0)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();
        assert!(manager_at(config(), T0 + 899).parse_token(&token).is_ok());
        let err = manager_at(config(), T0 + 900).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::Expired { expired_at } if expired_at == T0 + 900));
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let manager = TokenManager::new(TokenConfig {
            access_ttl_secs: 0,
            ..config()
        })
        .unwrap();
        let token = manager.generate_token(&claims(), TokenType::Access).unwrap();
        let err = manager.parse_token(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[test]
    fn future_not_before_is_rejected_until_reached() {
        let token = manager_at(config(), T0 + 60)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();
        let err = manager_at(config(), T0).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::NotYetValid { not_before } if not_before == T0 + 60));
        assert!(manager_at(config(), T0 + 60).parse_token(&token).is_ok());
    }

    #[test]
    fn leeway_tolerates_clock_skew() {
        let skewed = TokenConfig {
            leeway_secs: 120,
            ..config()
        };
        let token = manager_at(config(), T0 + 60)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();
        assert!(manager_at(skewed.clone(), T0).parse_token(&token).is_ok());
        assert!(manager_at(skewed.clone(), T0 + 60 + 900 + 119).parse_token(&token).is_ok());
        assert!(manager_at(skewed, T0 + 60 + 900 + 120).parse_token(&token).is_err());
    }

    #[test]
    fn issuer_and_audience_must_match() {
        let token = manager_at(config(), T0)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();

        let other_issuer = TokenConfig {
            issuer: "other".to_owned(),
            ..config()
        };
        let err = manager_at(other_issuer, T0).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::IssuerMismatch));

        let other_audience = TokenConfig {
            audience: "other-api".to_owned(),
            ..config()
        };
        let err = manager_at(other_audience, T0).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::AudienceMismatch));
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let manager = manager_at(config(), T0);
        let token = manager.generate_token(&claims(), TokenType::Access).unwrap();
        let mut segments: Vec<String> = token.split('.').map(str::to_owned).collect();
        let payload = &segments[1];
        let flipped = if payload.starts_with('e') { 'f' } else { 'e' };
        segments[1] = format!("{flipped}{}", &payload[1..]);
        let tampered = segments.join(".");

        let err = manager.parse_token(&tampered).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature), "{err:?}");
    }

    #[test]
    fn other_secret_fails_signature() {
        let token = manager_at(config(), T0)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();
        let other = TokenConfig {
            keys: SigningKeys::hmac("fedcba9876543210fedcba9876543210"),
            ..config()
        };
        let err = manager_at(other, T0).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature));
    }

    #[test]
    fn header_algorithm_must_match_configuration() {
        let token = manager_at(config(), T0)
            .generate_token(&claims(), TokenType::Access)
            .unwrap();
        let hs512 = TokenConfig {
            algorithm: TokenAlgorithm::Hs512,
            ..config()
        };
        let err = manager_at(hs512, T0).parse_token(&token).unwrap_err();
        assert!(matches!(err, TokenError::AlgorithmMismatch { .. }), "{err:?}");
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn structurally_broken_tokens_are_malformed() {
        let manager = manager_at(config(), T0);
        for bad in ["abc", "a.b", "a.b.c.d", "!!!.???.###"] {
            let err = manager.parse_token(bad).unwrap_err();
            assert!(matches!(err, TokenError::Malformed { .. }), "{bad}: {err:?}");
        }
        assert!(matches!(
            manager.parse_token(""),
            Err(TokenError::InputValidation { .. })
        ));
    }

    #[test]
    fn unsigned_none_algorithm_is_rejected() {
        let manager = manager_at(config(), T0);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            br#"{"iss":"svc","aud":["svc-api"],"nbf":0,"exp":99999999999,"user_id":"root"}"#,
        );
        let forged = format!("{header}.{payload}.");
        let err = manager.parse_token(&forged).unwrap_err();
        assert!(matches!(err, TokenError::Malformed { .. }), "{err:?}");
    }

    #[test]
    fn refresh_mints_access_token_with_identity_only() {
        let pair = manager_at(config(), T0)
            .generate_token_pair(&claims())
            .unwrap();

        let later = manager_at(config(), T0 + 600);
        let access = later.refresh_token(&pair.refresh_token).unwrap();
        let parsed = later.parse_token(&access).unwrap();

        assert_eq!(parsed.token_type, Some(TokenType::Access));
        assert_eq!(parsed.iat, Some(T0 + 600));
        assert_eq!(parsed.exp, Some(T0 + 600 + 900));
        assert_eq!(parsed.user_id.as_deref(), Some("user-42"));
        assert_eq!(parsed.sub.as_deref(), Some("user-42"));
        assert_eq!(parsed.email.as_deref(), Some("ada@example.com"));
        assert!(parsed.has_role("ops"));
        assert_eq!(parsed.custom.get("tenant"), Some(&Value::from("acme")));
    }

    #[test]
    fn refresh_rejects_access_tokens() {
        let manager = manager_at(config(), T0);
        let pair = manager.generate_token_pair(&claims()).unwrap();
        let err = manager.refresh_token(&pair.access_token).unwrap_err();
        assert!(matches!(
            err,
            TokenError::WrongTokenType {
                expected: TokenType::Refresh
            }
        ));
    }

    #[test]
    fn refresh_rejects_expired_refresh_tokens() {
        let pair = manager_at(config(), T0).generate_token_pair(&claims()).unwrap();
        let err = manager_at(config(), T0 + 7 * 24 * 60 * 60)
            .refresh_token(&pair.refresh_token)
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired { .. }));
    }

    #[test]
    fn token_pair_differs() {
        let pair = manager_at(config(), T0).generate_token_pair(&claims()).unwrap();
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn hmac_requires_secret() {
        let empty = TokenConfig {
            keys: SigningKeys::hmac(""),
            ..config()
        };
        assert!(matches!(
            TokenManager::new(empty),
            Err(TokenError::Configuration { .. })
        ));
    }

    #[test]
    fn key_family_must_match_algorithm() {
        let rsa_with_secret = TokenConfig {
            algorithm: TokenAlgorithm::Rs256,
            ..config()
        };
        assert!(matches!(
            TokenManager::new(rsa_with_secret),
            Err(TokenError::Configuration { .. })
        ));

        let hmac_with_pems = TokenConfig {
            keys: SigningKeys::rsa("a", "b"),
            ..config()
        };
        assert!(matches!(
            TokenManager::new(hmac_with_pems),
            Err(TokenError::Configuration { .. })
        ));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let cfg = TokenConfig {
            refresh_ttl_secs: u64::MAX,
            ..config()
        };
        assert!(matches!(
            TokenManager::new(cfg),
            Err(TokenError::Configuration { .. })
        ));
    }

    #[test]
    fn empty_issuer_is_rejected() {
        let cfg = TokenConfig {
            issuer: String::new(),
            ..config()
        };
        assert!(TokenManager::new(cfg).is_err());
    }

    #[test]
    fn audience_accepts_single_string() {
        let claims: Claims =
            serde_json::from_str(r#"{"aud":"svc-api","user_id":"u1"}"#).unwrap();
        assert_eq!(claims.aud, vec!["svc-api"]);
    }

    #[test]
    fn algorithm_parses_and_deserializes() {
        assert_eq!("rs384".parse::<TokenAlgorithm>().unwrap(), TokenAlgorithm::Rs384);
        assert!("ES256".parse::<TokenAlgorithm>().is_err());
        let alg: TokenAlgorithm = serde_json::from_str(r#""HS512""#).unwrap();
        assert_eq!(alg, TokenAlgorithm::Hs512);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: TokenConfig = serde_json::from_str(
            r#"{"keys":{"kind":"hmac","secret":"s3cret"},"issuer":"svc"}"#,
        )
        .unwrap();
        assert_eq!(cfg.issuer, "svc");
        assert_eq!(cfg.audience, "credvault-api");
        assert_eq!(cfg.access_ttl_secs, 900);
        assert_eq!(cfg.keys.family(), KeyFamily::Hmac);
        assert!(!format!("{:?}", cfg.keys).contains("s3cret"));
    }
}
