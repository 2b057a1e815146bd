//! Authenticated symmetric encryption for at-rest secrets.
//!
//! AES-GCM with 128, 192, or 256-bit keys, a 96-bit nonce and a 128-bit tag.
//! The AES variant follows from the key length.
//!
//! # Security model
//!
//! - Every encryption draws a fresh nonce from `OsRng`. Nonces are never
//!   derived from the input and never reused.
//! - Envelope format: `version (1 byte) || nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - Any authentication failure (wrong key, flipped bit, truncated tag) is
//!   reported as the single opaque [`CipherError::AuthenticationFailure`].
//! - Key bytes are zeroized on drop and never appear in `Debug` output.

use std::fmt;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CipherError;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Nonce length for AES-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-GCM (128 bits).
pub const TAG_LEN: usize = 16;

/// Shortest envelope that can be split into version and nonce.
pub const MIN_ENVELOPE_LEN: usize = 1 + NONCE_LEN;

/// Supported AES key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u32")]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    /// Map a bit count (128/192/256) to a key size.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Configuration`] for any other value.
    pub fn from_bits(bits: u32) -> Result<Self, CipherError> {
        match bits {
            128 => Ok(Self::Aes128),
            192 => Ok(Self::Aes192),
            256 => Ok(Self::Aes256),
            other => Err(CipherError::Configuration {
                reason: format!("key size must be 128, 192, or 256 bits, got {other}"),
            }),
        }
    }

    /// Map a byte length (16/24/32) to a key size.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Configuration`] for any other length.
    pub fn from_len(len: usize) -> Result<Self, CipherError> {
        match len {
            16 => Ok(Self::Aes128),
            24 => Ok(Self::Aes192),
            32 => Ok(Self::Aes256),
            other => Err(CipherError::Configuration {
                reason: format!("key must be 16, 24, or 32 bytes, got {other}"),
            }),
        }
    }

    /// Key length in bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::Aes128 => 128,
            Self::Aes192 => 192,
            Self::Aes256 => 256,
        }
    }

    /// Key length in bytes.
    #[must_use]
    pub fn byte_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

impl TryFrom<u32> for KeySize {
    type Error = CipherError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

/// An AES key that is zeroized on drop.
///
/// Construction guarantees a 16, 24, or 32 byte length.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Generate a random key of the given bit size using the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Configuration`] unless `bits` is 128, 192, or 256.
    pub fn generate(bits: u32) -> Result<Self, CipherError> {
        let size = KeySize::from_bits(bits)?;
        let mut bytes = vec![0u8; size.byte_len()];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self { bytes })
    }

    /// Wrap existing key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Configuration`] unless the slice is 16, 24, or 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        KeySize::from_len(bytes.len())?;
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Decode a key from its standard base64 transport form.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Malformed`] if the input is not base64 and
    /// [`CipherError::Configuration`] if the decoded length is unsupported.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::Malformed {
                reason: format!("key is not valid base64: {e}"),
            })?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    /// Encode the key as standard base64 for storage or config distribution.
    ///
    /// The caller must treat the returned string as secret.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Size class inferred from the key length.
    #[must_use]
    pub fn size(&self) -> KeySize {
        match self.bytes.len() {
            16 => KeySize::Aes128,
            24 => KeySize::Aes192,
            _ => KeySize::Aes256,
        }
    }

    /// Borrow the raw key bytes.
    ///
    /// The caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("size", &self.size())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Returns `version || nonce || ciphertext || tag`.
///
/// # Errors
///
/// - [`CipherError::InputValidation`] if the plaintext is empty.
/// - [`CipherError::Crypto`] if the AEAD cannot be built or fails to seal.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    if plaintext.is_empty() {
        return Err(CipherError::InputValidation {
            reason: "plaintext cannot be empty".to_owned(),
        });
    }

    match key.size() {
        KeySize::Aes128 => seal::<Aes128Gcm>(key.as_bytes(), plaintext),
        KeySize::Aes192 => seal::<Aes192Gcm>(key.as_bytes(), plaintext),
        KeySize::Aes256 => seal::<Aes256Gcm>(key.as_bytes(), plaintext),
    }
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// # Errors
///
/// - [`CipherError::InputValidation`] if the envelope is empty.
/// - [`CipherError::Malformed`] if it is shorter than version + nonce or
///   carries an unknown version.
/// - [`CipherError::AuthenticationFailure`] if the tag does not verify.
pub fn decrypt(key: &EncryptionKey, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
    if envelope.is_empty() {
        return Err(CipherError::InputValidation {
            reason: "ciphertext cannot be empty".to_owned(),
        });
    }
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CipherError::Malformed {
            reason: format!(
                "ciphertext too short: expected at least {MIN_ENVELOPE_LEN} bytes, got {}",
                envelope.len()
            ),
        });
    }

    let (version, body) = envelope.split_at(1);
    if version != [ENVELOPE_VERSION] {
        return Err(CipherError::Malformed {
            reason: format!("unsupported envelope version {}", version[0]),
        });
    }

    match key.size() {
        KeySize::Aes128 => open::<Aes128Gcm>(key.as_bytes(), body),
        KeySize::Aes192 => open::<Aes192Gcm>(key.as_bytes(), body),
        KeySize::Aes256 => open::<Aes256Gcm>(key.as_bytes(), body),
    }
}

fn seal<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|e| CipherError::Crypto {
        reason: format!("failed to create cipher: {e}"),
    })?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CipherError::Crypto {
            reason: format!("failed to seal: {e}"),
        })?;

    // version || nonce || ciphertext (tag appended by aes-gcm)
    let mut envelope = Vec::with_capacity(1 + nonce.len() + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

fn open<C>(key: &[u8], body: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + AeadCore + KeyInit,
{
    let nonce_len = C::NonceSize::USIZE;
    if body.len() < nonce_len {
        return Err(CipherError::Malformed {
            reason: format!("ciphertext shorter than the {nonce_len}-byte nonce"),
        });
    }

    let cipher = C::new_from_slice(key).map_err(|e| CipherError::Crypto {
        reason: format!("failed to create cipher: {e}"),
    })?;
    let (nonce_bytes, ciphertext) = body.split_at(nonce_len);
    let nonce = GenericArray::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        debug!("envelope failed authentication");
        CipherError::AuthenticationFailure
    })
}

/// Encrypts and decrypts with one configured key.
///
/// Immutable after construction; safe to share across threads.
#[derive(Debug, Clone)]
pub struct SymmetricCipher {
    key: EncryptionKey,
}

impl SymmetricCipher {
    /// Wrap a validated key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Size of the wrapped key.
    #[must_use]
    pub fn key_size(&self) -> KeySize {
        self.key.size()
    }

    /// Seal raw bytes. See [`encrypt`].
    ///
    /// # Errors
    ///
    /// See [`encrypt`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        encrypt(&self.key, plaintext)
    }

    /// Open raw bytes. See [`decrypt`].
    ///
    /// # Errors
    ///
    /// See [`decrypt`].
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        decrypt(&self.key, envelope)
    }

    /// Seal a string and return the envelope as standard base64.
    ///
    /// # Errors
    ///
    /// See [`encrypt`].
    pub fn encrypt_string(&self, plaintext: &str) -> Result<String, CipherError> {
        let envelope = self.encrypt(plaintext.as_bytes())?;
        Ok(STANDARD.encode(envelope))
    }

    /// Open a standard base64 envelope produced by [`encrypt_string`](Self::encrypt_string).
    ///
    /// # Errors
    ///
    /// - [`CipherError::InputValidation`] if the input is empty.
    /// - [`CipherError::Malformed`] if it is not base64, is too short, or the
    ///   plaintext is not UTF-8.
    /// - [`CipherError::AuthenticationFailure`] if the tag does not verify.
    pub fn decrypt_string(&self, encoded: &str) -> Result<String, CipherError> {
        if encoded.is_empty() {
            return Err(CipherError::InputValidation {
                reason: "ciphertext cannot be empty".to_owned(),
            });
        }
        let envelope = STANDARD
            .decode(encoded)
            .map_err(|e| CipherError::Malformed {
                reason: format!("ciphertext is not valid base64: {e}"),
            })?;
        let plaintext = self.decrypt(&envelope)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed {
            reason: "plaintext is not valid UTF-8".to_owned(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip_all_key_sizes() {
        for bits in [128, 192, 256] {
            let key = EncryptionKey::generate(bits).unwrap();
            let plaintext = b"secret data for credvault";
            let envelope = encrypt(&key, plaintext).unwrap();
            let decrypted = decrypt(&key, &envelope).unwrap();
            assert_eq!(plaintext.as_slice(), decrypted.as_slice(), "bits={bits}");
        }
    }

    #[test]
    fn generate_rejects_unsupported_sizes() {
        for bits in [0, 64, 127, 255, 512] {
            let err = EncryptionKey::generate(bits).unwrap_err();
            assert!(matches!(err, CipherError::Configuration { .. }), "bits={bits}");
        }
    }

    #[test]
    fn generate_produces_requested_length() {
        assert_eq!(EncryptionKey::generate(128).unwrap().as_bytes().len(), 16);
        assert_eq!(EncryptionKey::generate(192).unwrap().as_bytes().len(), 24);
        assert_eq!(EncryptionKey::generate(256).unwrap().as_bytes().len(), 32);
    }

    #[test]
    fn from_bytes_rejects_bad_lengths() {
        assert!(EncryptionKey::from_bytes(&[0u8; 15]).is_err());
        assert!(EncryptionKey::from_bytes(&[0u8; 33]).is_err());
        assert!(EncryptionKey::from_bytes(&[]).is_err());
        assert!(EncryptionKey::from_bytes(&[7u8; 24]).is_ok());
    }

    #[test]
    fn key_base64_roundtrip() {
        let key = EncryptionKey::generate(256).unwrap();
        let restored = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn key_from_invalid_base64_is_malformed() {
        let err = EncryptionKey::from_base64("not base64!!").unwrap_err();
        assert!(matches!(err, CipherError::Malformed { .. }));
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        let key = EncryptionKey::generate(256).unwrap();
        let err = encrypt(&key, b"").unwrap_err();
        assert!(matches!(err, CipherError::InputValidation { .. }));
    }

    #[test]
    fn decrypt_wrong_key_is_authentication_failure() {
        let key1 = EncryptionKey::generate(256).unwrap();
        let key2 = EncryptionKey::generate(256).unwrap();
        let envelope = encrypt(&key1, b"secret").unwrap();
        let result = decrypt(&key2, &envelope);
        assert!(matches!(result, Err(CipherError::AuthenticationFailure)));
    }

    #[test]
    fn decrypt_short_envelope_is_malformed() {
        let key = EncryptionKey::generate(256).unwrap();
        for len in 1..MIN_ENVELOPE_LEN {
            let mut envelope = vec![0u8; len];
            envelope[0] = ENVELOPE_VERSION;
            let result = decrypt(&key, &envelope);
            assert!(matches!(result, Err(CipherError::Malformed { .. })), "len={len}");
        }
    }

    #[test]
    fn decrypt_missing_tag_is_authentication_failure() {
        let key = EncryptionKey::generate(256).unwrap();
        let mut envelope = vec![ENVELOPE_VERSION];
        envelope.extend_from_slice(&[0u8; NONCE_LEN + 4]);
        let result = decrypt(&key, &envelope);
        assert!(matches!(result, Err(CipherError::AuthenticationFailure)));
    }

    #[test]
    fn decrypt_unknown_version_is_malformed() {
        let key = EncryptionKey::generate(128).unwrap();
        let mut envelope = encrypt(&key, b"data").unwrap();
        envelope[0] = 0x7F;
        let result = decrypt(&key, &envelope);
        assert!(matches!(result, Err(CipherError::Malformed { .. })));
    }

    #[test]
    fn decrypt_tampered_ciphertext_fails() {
        let key = EncryptionKey::generate(256).unwrap();
        let mut envelope = encrypt(&key, b"secret").unwrap();
        // Flip a byte in the ciphertext portion (after version and nonce).
        if let Some(byte) = envelope.get_mut(1 + NONCE_LEN) {
            *byte ^= 0xFF;
        }
        let result = decrypt(&key, &envelope);
        assert!(matches!(result, Err(CipherError::AuthenticationFailure)));
    }

    #[test]
    fn envelope_layout() {
        let key = EncryptionKey::generate(192).unwrap();
        let envelope = encrypt(&key, b"data").unwrap();
        assert_eq!(envelope[0], ENVELOPE_VERSION);
        assert_eq!(envelope.len(), 1 + NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn two_encryptions_produce_different_ciphertext() {
        let key = EncryptionKey::generate(256).unwrap();
        let ct1 = encrypt(&key, b"same data").unwrap();
        let ct2 = encrypt(&key, b"same data").unwrap();
        assert_ne!(ct1[1..=NONCE_LEN], ct2[1..=NONCE_LEN]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn string_roundtrip() {
        let cipher = SymmetricCipher::new(EncryptionKey::generate(256).unwrap());
        let encoded = cipher.encrypt_string("hello").unwrap();
        assert_eq!(cipher.decrypt_string(&encoded).unwrap(), "hello");
    }

    #[test]
    fn string_decrypt_rejects_non_base64() {
        let cipher = SymmetricCipher::new(EncryptionKey::generate(256).unwrap());
        let err = cipher.decrypt_string("%%%").unwrap_err();
        assert!(matches!(err, CipherError::Malformed { .. }));
        let err = cipher.decrypt_string("").unwrap_err();
        assert!(matches!(err, CipherError::InputValidation { .. }));
    }

    #[test]
    fn string_decrypt_rejects_short_envelope() {
        let cipher = SymmetricCipher::new(EncryptionKey::generate(256).unwrap());
        for short in ["AQ==", "AQIDBAUGBwgJCgsM"] {
            let err = cipher.decrypt_string(short).unwrap_err();
            assert!(matches!(err, CipherError::Malformed { .. }), "{short}: {err:?}");
        }
    }

    #[test]
    fn key_debug_redacts_bytes() {
        let key = EncryptionKey::from_bytes(&[0xAB; 32]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn key_size_deserializes_from_bits() {
        let size: KeySize = serde_json::from_str("192").unwrap();
        assert_eq!(size, KeySize::Aes192);
        assert!(serde_json::from_str::<KeySize>("100").is_err());
    }
}
