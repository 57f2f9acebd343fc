//! Hybrid encryption engine
//!
//! The payload is sealed with a fresh AES-256-GCM key; that key is wrapped
//! to the recipient's X25519 public key. Receiving reverses both steps with
//! the active user's private key, and still opens the older untagged
//! format where the whole message was wrapped directly.

use super::{
    decode_public_key, unwrap_with_any, AesGcmCodec, DataKey, KeyWrapScheme, SymmetricCodec,
    DATA_KEY_SIZE,
};
use crate::config::CryptoConfig;
use crate::envelope::{HybridEnvelope, PayloadFormat, SerializedEnvelope};
use crate::keystore::{public_key_fingerprint, KeyContext, KeyStore};
use crate::{DashkeyError, Result};
use crypto_box::SecretKey;
use zeroize::Zeroizing;

/// Result of decrypting a received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// A recognized envelope opened and verified
    Decrypted(String),
    /// No recognized envelope; the input is returned as-is
    AlreadyPlaintext(String),
    /// Recognized format, but the wrapped key or the AEAD tag did not verify
    AuthenticationFailed,
    /// Tagged as hybrid but not parseable
    MalformedEnvelope(String),
}

impl DecryptOutcome {
    /// Readable text, if there is any
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            DecryptOutcome::Decrypted(text) | DecryptOutcome::AlreadyPlaintext(text) => Some(text),
            DecryptOutcome::AuthenticationFailed | DecryptOutcome::MalformedEnvelope(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.plaintext().is_none()
    }
}

pub struct HybridEngine<C: SymmetricCodec = AesGcmCodec> {
    codec: C,
    schemes: Vec<KeyWrapScheme>,
}

impl HybridEngine<AesGcmCodec> {
    pub fn new(config: &CryptoConfig) -> Self {
        Self::with_codec(AesGcmCodec, config)
    }
}

impl Default for HybridEngine<AesGcmCodec> {
    fn default() -> Self {
        Self::new(&CryptoConfig::default())
    }
}

impl<C: SymmetricCodec> HybridEngine<C> {
    pub fn with_codec(codec: C, config: &CryptoConfig) -> Self {
        Self {
            codec,
            schemes: config.wrap_schemes.clone(),
        }
    }

    /// Wrap schemes in preference order
    pub fn schemes(&self) -> &[KeyWrapScheme] {
        &self.schemes
    }

    fn preferred_scheme(&self) -> KeyWrapScheme {
        self.schemes.first().copied().unwrap_or(KeyWrapScheme::SealedBox)
    }

    /// Encrypt UTF-8 text for the holder of `recipient_public_key`
    pub fn encrypt_for_recipient(
        &self,
        plaintext: &str,
        recipient_public_key: &str,
    ) -> Result<SerializedEnvelope> {
        self.encrypt_bytes_for_recipient(plaintext.as_bytes(), recipient_public_key)
    }

    /// Encrypt an arbitrary binary payload, such as a file
    pub fn encrypt_bytes_for_recipient(
        &self,
        payload: &[u8],
        recipient_public_key: &str,
    ) -> Result<SerializedEnvelope> {
        let recipient = decode_public_key(recipient_public_key)?;
        let sealed = self.codec.encrypt(payload)?;
        let scheme = self.preferred_scheme();
        let wrapped_key = scheme.wrap(&sealed.key[..], &recipient)?;

        tracing::debug!(
            recipient = %public_key_fingerprint(recipient_public_key),
            scheme = %scheme,
            payload_len = payload.len(),
            "Encrypted hybrid envelope"
        );

        Ok(HybridEnvelope::new(sealed.ciphertext, wrapped_key, sealed.nonce).serialize())
    }

    /// Decrypt a received payload with the context user's private key
    ///
    /// `Err` is returned only for key store problems. Format and
    /// verification failures are reported through [`DecryptOutcome`].
    pub fn decrypt_from_sender(
        &self,
        keys: &KeyStore,
        ctx: &KeyContext,
        serialized: &str,
    ) -> Result<DecryptOutcome> {
        match PayloadFormat::detect(serialized) {
            PayloadFormat::Hybrid(body) => {
                let envelope = match HybridEnvelope::parse(body) {
                    Ok(envelope) => envelope,
                    Err(e) => return Self::failure_outcome(e),
                };
                let private_key = keys.private_key(ctx)?;

                let opened = self
                    .open(&envelope, private_key.secret())
                    .and_then(Self::into_text);
                match opened {
                    Ok(text) => Ok(DecryptOutcome::Decrypted(text)),
                    Err(e) => Self::failure_outcome(e),
                }
            }
            PayloadFormat::LegacyCandidate(bytes) if bytes.len() >= self.min_legacy_len() => {
                let private_key = keys.private_key(ctx)?;
                let opened = unwrap_with_any(&self.schemes, &bytes, private_key.secret())
                    .and_then(|(_, plain)| Self::into_text(plain));
                match opened {
                    Ok(text) => {
                        tracing::debug!("Opened legacy direct-asymmetric payload");
                        Ok(DecryptOutcome::Decrypted(text))
                    }
                    Err(_) => {
                        tracing::debug!(
                            payload_len = serialized.len(),
                            "Untagged payload did not open, treating as plaintext"
                        );
                        Ok(DecryptOutcome::AlreadyPlaintext(serialized.to_string()))
                    }
                }
            }
            PayloadFormat::LegacyCandidate(_) | PayloadFormat::Plain => {
                Ok(DecryptOutcome::AlreadyPlaintext(serialized.to_string()))
            }
        }
    }

    /// Decrypt a binary hybrid payload; every failure is an error
    pub fn decrypt_bytes_from_sender(
        &self,
        keys: &KeyStore,
        ctx: &KeyContext,
        serialized: &str,
    ) -> Result<Vec<u8>> {
        let envelope = HybridEnvelope::parse(serialized)?;
        let private_key = keys.private_key(ctx)?;
        self.open(&envelope, private_key.secret())
    }

    fn open(&self, envelope: &HybridEnvelope, secret: &SecretKey) -> Result<Vec<u8>> {
        let (scheme, unwrapped) = unwrap_with_any(&self.schemes, &envelope.wrapped_key, secret)?;
        let unwrapped = Zeroizing::new(unwrapped);
        if unwrapped.len() != DATA_KEY_SIZE {
            return Err(DashkeyError::MalformedEnvelope(format!(
                "wrapped key holds {} bytes",
                unwrapped.len()
            )));
        }
        let mut data_key: Zeroizing<DataKey> = Zeroizing::new([0u8; DATA_KEY_SIZE]);
        data_key.copy_from_slice(&unwrapped);

        tracing::trace!(scheme = %scheme, "Unwrapped data key");
        self.codec
            .decrypt(&envelope.encrypted_payload, &data_key, &envelope.nonce)
    }

    /// Shortest untagged input that could be wrapped ciphertext
    fn min_legacy_len(&self) -> usize {
        self.schemes
            .iter()
            .map(KeyWrapScheme::overhead)
            .min()
            .unwrap_or(usize::MAX)
    }

    fn into_text(bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes)
            .map_err(|_| DashkeyError::MalformedEnvelope("plaintext is not UTF-8".to_string()))
    }

    fn failure_outcome(error: DashkeyError) -> Result<DecryptOutcome> {
        match error {
            DashkeyError::AuthenticationFailed => {
                tracing::warn!("Hybrid envelope failed authentication");
                Ok(DecryptOutcome::AuthenticationFailed)
            }
            DashkeyError::MalformedEnvelope(reason) => {
                tracing::warn!(%reason, "Malformed hybrid envelope");
                Ok(DecryptOutcome::MalformedEnvelope(reason))
            }
            other => Err(other),
        }
    }
}
