//! Key wrapping with X25519 boxes (crypto_box / XSalsa20-Poly1305)
//!
//! A wrap scheme encrypts a small secret (a symmetric data key, or a whole
//! short message for legacy ciphertext) to a recipient's public key. Several
//! schemes can be configured; unwrapping tries them in order so material
//! produced under an older scheme keeps opening after the default changes.

use super::ASYMMETRIC_KEY_SIZE;
use crate::{DashkeyError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use crypto_box::{
    aead::{Aead, OsRng},
    PublicKey, SalsaBox, SecretKey,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// XSalsa20 nonce size used by the ephemeral box layout
const BOX_NONCE_SIZE: usize = 24;

/// Poly1305 tag size
const BOX_TAG_SIZE: usize = 16;

/// Supported key wrap layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyWrapScheme {
    /// Anonymous sealed box: `ephemeral_pk || box`, nonce derived from both keys
    SealedBox,
    /// Older layout: `ephemeral_pk || nonce || box` with a random nonce
    EphemeralBox,
}

impl KeyWrapScheme {
    /// Bytes added on top of the wrapped secret
    pub fn overhead(&self) -> usize {
        match self {
            KeyWrapScheme::SealedBox => ASYMMETRIC_KEY_SIZE + BOX_TAG_SIZE,
            KeyWrapScheme::EphemeralBox => ASYMMETRIC_KEY_SIZE + BOX_NONCE_SIZE + BOX_TAG_SIZE,
        }
    }

    /// Encrypt `secret` so only the holder of the recipient's private key can read it
    pub fn wrap(&self, secret: &[u8], recipient: &PublicKey) -> Result<Vec<u8>> {
        match self {
            KeyWrapScheme::SealedBox => recipient
                .seal(&mut OsRng, secret)
                .map_err(|_| DashkeyError::Encryption("Sealed box wrap failed".to_string())),
            KeyWrapScheme::EphemeralBox => {
                let ephemeral_sk = SecretKey::generate(&mut OsRng);
                let ephemeral_pk = ephemeral_sk.public_key();
                let parsed_box = SalsaBox::new(recipient, &ephemeral_sk);

                let mut nonce_bytes = [0u8; BOX_NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = crypto_box::Nonce::from_slice(&nonce_bytes);

                let ciphertext = parsed_box
                    .encrypt(nonce, secret)
                    .map_err(|_| DashkeyError::Encryption("Ephemeral box wrap failed".to_string()))?;

                let mut wrapped = Vec::with_capacity(self.overhead() + secret.len());
                wrapped.extend_from_slice(ephemeral_pk.as_bytes());
                wrapped.extend_from_slice(&nonce_bytes);
                wrapped.extend(ciphertext);
                Ok(wrapped)
            }
        }
    }

    /// Recover a wrapped secret; any verification failure is `AuthenticationFailed`
    pub(crate) fn unwrap(&self, wrapped: &[u8], secret_key: &SecretKey) -> Result<Vec<u8>> {
        if wrapped.len() < self.overhead() {
            return Err(DashkeyError::AuthenticationFailed);
        }
        match self {
            KeyWrapScheme::SealedBox => secret_key
                .unseal(wrapped)
                .map_err(|_| DashkeyError::AuthenticationFailed),
            KeyWrapScheme::EphemeralBox => {
                let (pk_bytes, rest) = wrapped.split_at(ASYMMETRIC_KEY_SIZE);
                let (nonce_bytes, ciphertext) = rest.split_at(BOX_NONCE_SIZE);

                // X25519 ignores bit 255, so a set bit would open under the same secret
                if pk_bytes[ASYMMETRIC_KEY_SIZE - 1] & 0x80 != 0 {
                    return Err(DashkeyError::AuthenticationFailed);
                }

                let mut ephemeral = [0u8; ASYMMETRIC_KEY_SIZE];
                ephemeral.copy_from_slice(pk_bytes);
                let ephemeral_pk = PublicKey::from(ephemeral);

                let parsed_box = SalsaBox::new(&ephemeral_pk, secret_key);
                let nonce = crypto_box::Nonce::from_slice(nonce_bytes);

                parsed_box
                    .decrypt(nonce, ciphertext)
                    .map_err(|_| DashkeyError::AuthenticationFailed)
            }
        }
    }
}

impl fmt::Display for KeyWrapScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyWrapScheme::SealedBox => write!(f, "sealed_box"),
            KeyWrapScheme::EphemeralBox => write!(f, "ephemeral_box"),
        }
    }
}

/// Try each scheme in order, returning the first that opens `wrapped`
pub(crate) fn unwrap_with_any(
    schemes: &[KeyWrapScheme],
    wrapped: &[u8],
    secret_key: &SecretKey,
) -> Result<(KeyWrapScheme, Vec<u8>)> {
    for scheme in schemes {
        match scheme.unwrap(wrapped, secret_key) {
            Ok(secret) => return Ok((*scheme, secret)),
            Err(_) => tracing::trace!(scheme = %scheme, "unwrap scheme did not match"),
        }
    }
    Err(DashkeyError::AuthenticationFailed)
}

/// Generate a new X25519 key pair
pub(crate) fn generate_key_pair() -> SecretKey {
    SecretKey::generate(&mut OsRng)
}

/// Decode a base64 (standard alphabet) X25519 public key
pub fn decode_public_key(public_key_b64: &str) -> Result<PublicKey> {
    let bytes = STANDARD
        .decode(public_key_b64.trim())
        .map_err(|e| DashkeyError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; ASYMMETRIC_KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
        DashkeyError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            ASYMMETRIC_KEY_SIZE,
            b.len()
        ))
    })?;
    Ok(PublicKey::from(bytes))
}

/// Encode a public key for distribution
pub fn encode_public_key(public_key: &PublicKey) -> String {
    STANDARD.encode(public_key.as_bytes())
}
