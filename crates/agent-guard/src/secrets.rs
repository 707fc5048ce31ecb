//! Secrets at Rest
//!
//! Authenticated encryption of stored string fields with AES-256-GCM.
//! Ciphertext is a printable string:
//!
//! ```text
//! enc:v1:<base64 nonce>:<base64 ciphertext+tag>
//! ```
//!
//! The key is handed to [`SecretBox`] at construction; nothing here reads the
//! environment. Absent values pass through unchanged. Anything else that is
//! not ciphertext, or ciphertext that fails authentication, is an error:
//! decryption never hands back input it could not verify.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{GuardError, Result};

const PREFIX: &str = "enc:v1:";

/// Nonce length in bytes (96 bits for AES-GCM)
const NONCE_LENGTH: usize = 12;

/// Key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Encrypts and decrypts string fields with one injected key
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(<redacted>)")
    }
}

impl SecretBox {
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(key)),
        }
    }

    /// 64 hex characters
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim()).map_err(|e| GuardError::InvalidKey(format!("not hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Standard base64 of exactly 32 bytes
    pub fn from_base64(key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| GuardError::InvalidKey(format!("not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Derive the key as the SHA-256 digest of a passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(GuardError::InvalidKey("passphrase must not be empty".into()));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        Self::from_bytes(&digest)
    }

    /// Accept a key the way operators write it: 64 hex characters, base64 of
    /// 32 bytes, or otherwise a passphrase.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let trimmed = secret.trim();
        if trimmed.len() == KEY_LENGTH * 2 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex(trimmed);
        }
        if let Ok(bytes) = BASE64.decode(trimmed) {
            if bytes.len() == KEY_LENGTH {
                return Self::from_bytes(&bytes);
            }
        }
        Self::from_passphrase(secret)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            GuardError::InvalidKey(format!("expected {KEY_LENGTH} bytes, got {}", bytes.len()))
        })?;
        Ok(Self::new(key))
    }

    /// Whether a value looks like this module's ciphertext
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(PREFIX)
    }

    /// Encrypt with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| GuardError::Encryption(e.to_string()))?;

        Ok(format!(
            "{PREFIX}{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, value: &str) -> Result<String> {
        let inner = value
            .strip_prefix(PREFIX)
            .ok_or_else(|| GuardError::InvalidFormat("missing enc:v1 prefix".into()))?;

        let (nonce_b64, ciphertext_b64) = inner
            .split_once(':')
            .ok_or_else(|| GuardError::InvalidFormat("expected nonce:ciphertext".into()))?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| GuardError::InvalidFormat(format!("nonce is not base64: {e}")))?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(GuardError::InvalidFormat(format!(
                "nonce must be {NONCE_LENGTH} bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| GuardError::InvalidFormat(format!("ciphertext is not base64: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| GuardError::Decryption("authentication failed".into()))?;

        String::from_utf8(plaintext).map_err(|_| GuardError::Decryption("plaintext is not UTF-8".into()))
    }

    /// [`encrypt`](Self::encrypt), passing `None` through
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// [`decrypt`](Self::decrypt), passing `None` through
    pub fn decrypt_opt(&self, value: Option<&str>) -> Result<Option<String>> {
        value.map(|v| self.decrypt(v)).transpose()
    }
}
