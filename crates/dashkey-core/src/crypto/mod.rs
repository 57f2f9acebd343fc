//! Encryption primitives
//!
//! AES-256-GCM for payloads, X25519 boxes (crypto_box) for key wrapping, and
//! the hybrid engine combining the two.

mod aead;
mod hybrid;
mod wrap;

pub use aead::AesGcmCodec;
pub use hybrid::{DecryptOutcome, HybridEngine};
pub use wrap::{decode_public_key, encode_public_key, KeyWrapScheme};
pub(crate) use wrap::{generate_key_pair, unwrap_with_any};

use crate::Result;
use zeroize::Zeroizing;

/// Symmetric key size in bytes (AES-256)
pub const DATA_KEY_SIZE: usize = 32;

/// AEAD nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AEAD authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// X25519 key size in bytes
pub const ASYMMETRIC_KEY_SIZE: usize = 32;

/// Symmetric data key (256 bits)
pub type DataKey = [u8; DATA_KEY_SIZE];

/// AEAD nonce
pub type Nonce = [u8; NONCE_SIZE];

/// Output of one symmetric encryption: fresh key, fresh nonce, and the
/// ciphertext with its tag appended
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub key: Zeroizing<DataKey>,
    pub nonce: Nonce,
}

impl std::fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedPayload")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key", &"<redacted>")
            .field("nonce", &hex::encode(self.nonce))
            .finish()
    }
}

/// Authenticated symmetric encryption of arbitrary-length payloads
pub trait SymmetricCodec: Send + Sync {
    /// Encrypt under a freshly generated key and nonce
    fn encrypt(&self, plaintext: &[u8]) -> Result<SealedPayload>;

    /// Decrypt and verify; fails with `AuthenticationFailed` on any tag mismatch
    fn decrypt(&self, ciphertext: &[u8], key: &DataKey, nonce: &Nonce) -> Result<Vec<u8>>;
}
