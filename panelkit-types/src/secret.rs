//! The at-rest shape of an encrypted credential.
//!
//! This is a data type only. Encryption and decryption live in
//! `panelkit-vault`; this crate defines the vocabulary so connectors can
//! be serialized without dragging in crypto dependencies.

use serde::{Deserialize, Serialize};

/// An encrypted secret as stored inside a [`crate::connector::ConnectorInfo`].
///
/// Never holds plaintext. Safe to serialize, log, and persist — the
/// ciphertext is useless without the vault's master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Algorithm tag, e.g. `"aes-256-gcm"`. The vault refuses tags it
    /// does not recognize rather than guessing.
    pub algorithm: String,
    /// Base64-encoded nonce, fresh per encryption.
    pub nonce: String,
    /// Base64-encoded ciphertext (includes the authentication tag).
    pub ciphertext: String,
}
