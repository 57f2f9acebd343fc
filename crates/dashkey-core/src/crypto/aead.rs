//! AES-256-GCM envelope codec

use super::{DataKey, Nonce, SealedPayload, SymmetricCodec, DATA_KEY_SIZE, NONCE_SIZE};
use crate::{DashkeyError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// AES-256-GCM codec. Every call draws a new key and nonce from the OS
/// CSPRNG, so a nonce is never used twice under one key.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCodec;

impl AesGcmCodec {
    pub fn new() -> Self {
        Self
    }

    fn generate_data_key(&self) -> Zeroizing<DataKey> {
        let mut key = Zeroizing::new([0u8; DATA_KEY_SIZE]);
        OsRng.fill_bytes(&mut key[..]);
        key
    }

    fn generate_nonce(&self) -> Nonce {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

impl SymmetricCodec for AesGcmCodec {
    fn encrypt(&self, plaintext: &[u8]) -> Result<SealedPayload> {
        let key = self.generate_data_key();
        let nonce = self.generate_nonce();

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        let ciphertext = cipher
            .encrypt(AesNonce::from_slice(&nonce), plaintext)
            .map_err(|_| DashkeyError::Encryption("Symmetric encryption failed".to_string()))?;

        Ok(SealedPayload {
            ciphertext,
            key,
            nonce,
        })
    }

    fn decrypt(&self, ciphertext: &[u8], key: &DataKey, nonce: &Nonce) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

        cipher
            .decrypt(AesNonce::from_slice(nonce), ciphertext)
            .map_err(|_| DashkeyError::AuthenticationFailed)
    }
}
