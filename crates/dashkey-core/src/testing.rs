//! Test-only key access
//!
//! Narrow hooks for test harnesses that need material the production API
//! deliberately does not expose. Private keys are not exported here either.

use crate::crypto::decode_public_key;
use crate::keystore::{KeyContext, KeyStore};
use crate::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub trait TestKeyAccess {
    /// Untagged direct-asymmetric ciphertext, as produced by pre-hybrid clients
    fn legacy_seal(&self, public_key_b64: &str, plaintext: &str) -> Result<String>;

    /// Raw public key bytes of the context's user
    fn public_key_bytes(&self, ctx: &KeyContext) -> Result<Vec<u8>>;
}

impl TestKeyAccess for KeyStore {
    fn legacy_seal(&self, public_key_b64: &str, plaintext: &str) -> Result<String> {
        let recipient = decode_public_key(public_key_b64)?;
        let sealed = self
            .config()
            .preferred_scheme()
            .wrap(plaintext.as_bytes(), &recipient)?;
        Ok(STANDARD.encode(sealed))
    }

    fn public_key_bytes(&self, ctx: &KeyContext) -> Result<Vec<u8>> {
        let encoded = self.current_user_public_key(ctx)?;
        Ok(decode_public_key(&encoded)?.as_bytes().to_vec())
    }
}
