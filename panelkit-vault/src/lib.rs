#![deny(missing_docs)]
//! Credential vault for panelkit connectors.
//!
//! This crate owns the single process-wide decryption key and turns
//! connector passwords into [`EncryptedSecret`] values (AES-256-GCM,
//! fresh random nonce per encryption, base64 at rest) and back.
//!
//! Decrypted plaintext is only reachable through [`DecryptedSecret`]
//! (no Clone, no Display, no Serialize — memory zeroed on drop), and the
//! only way to read it is the closure-scoped [`DecryptedSecret::with_str`].
//! The vault never writes plaintext to any durable store.
//!
//! A ciphertext that cannot be authenticated (wrong key, corruption,
//! tampering) fails with [`VaultError::Auth`], which callers must keep
//! distinguishable from downstream connection failures.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use panelkit_types::EncryptedSecret;
use thiserror::Error;
use zeroize::Zeroizing;

/// The algorithm tag written into every secret this vault produces.
pub const ALGORITHM: &str = "aes-256-gcm";

/// Errors from vault operations (crate-local, not in panelkit-types).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VaultError {
    /// The ciphertext could not be authenticated: wrong master key,
    /// corrupted secret, or tampering.
    #[error("secret could not be authenticated")]
    Auth,

    /// The secret's encoding is malformed (bad base64, wrong nonce
    /// length, non-UTF-8 plaintext).
    #[error("malformed secret: {0}")]
    Format(String),

    /// The secret was produced by an algorithm this vault does not know.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The master key material is invalid.
    #[error("invalid master key: {0}")]
    Key(String),
}

/// The process-wide master key, established once at startup from an
/// out-of-band secret. Never part of a persisted project or panel.
///
/// Explicit state injected into the [`Vault`], not a global lookup —
/// tests construct one from a fixed byte array.
pub struct MasterKey {
    bytes: Zeroizing<[u8; 32]>,
}

impl MasterKey {
    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Build a key from a 64-character hex string.
    pub fn from_hex(encoded: &str) -> Result<Self, VaultError> {
        let decoded =
            hex::decode(encoded.trim()).map_err(|e| VaultError::Key(e.to_string()))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|decoded: Vec<u8>| {
                VaultError::Key(format!("expected 32 key bytes, got {}", decoded.len()))
            })?;
        Ok(Self::from_bytes(bytes))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// A decrypted credential. Cannot be logged, serialized, or cloned.
/// Memory is zeroed on drop via [`Zeroizing`].
///
/// The only way to access the plaintext is [`DecryptedSecret::with_str`],
/// which enforces scoped exposure — the value is only visible inside the
/// closure and must not be retained beyond the call that needs it.
pub struct DecryptedSecret {
    inner: Zeroizing<String>,
}

impl DecryptedSecret {
    /// Scoped exposure. The plaintext is only accessible inside the
    /// closure. This is the ONLY way to read the value.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.inner)
    }

    /// Length of the plaintext in bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the plaintext is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for DecryptedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Intentionally: no Display, no Clone, no Serialize, no PartialEq.

/// Encrypts and decrypts connector credentials with the process-wide key.
///
/// Safe for concurrent callers; the cipher is stateless apart from the key.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    /// Create a vault around the given master key.
    pub fn new(key: MasterKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*key.bytes));
        Self { cipher }
    }

    /// Encrypt a plaintext credential. Each call draws a fresh nonce, so
    /// encrypting the same plaintext twice yields different ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Auth)?;
        Ok(EncryptedSecret {
            algorithm: ALGORITHM.into(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt a secret. Fails with [`VaultError::Auth`] if the ciphertext
    /// cannot be authenticated against the master key.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<DecryptedSecret, VaultError> {
        if secret.algorithm != ALGORITHM {
            return Err(VaultError::UnsupportedAlgorithm(secret.algorithm.clone()));
        }
        let nonce_bytes = BASE64
            .decode(&secret.nonce)
            .map_err(|e| VaultError::Format(format!("nonce: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(VaultError::Format(format!(
                "nonce must be 12 bytes, got {}",
                nonce_bytes.len()
            )));
        }
        let ciphertext = BASE64
            .decode(&secret.ciphertext)
            .map_err(|e| VaultError::Format(format!("ciphertext: {e}")))?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| VaultError::Auth)?;
        let plaintext = Zeroizing::new(plaintext);
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| VaultError::Format("plaintext is not UTF-8".into()))?;
        Ok(DecryptedSecret {
            inner: Zeroizing::new(text.to_owned()),
        })
    }
}
