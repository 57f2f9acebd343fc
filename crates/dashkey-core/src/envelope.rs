//! Envelope value type and its flat string wire format
//!
//! ```text
//! HYBRID:<b64 ciphertext>:<b64 wrapped key>:<b64 nonce>
//! ```
//!
//! Base64 is the standard alphabet with padding and no line wrapping. A
//! payload without the `HYBRID:` tag is either legacy direct-asymmetric
//! ciphertext (bare base64) or clear text from before encryption was enabled.

use crate::crypto::{Nonce, NONCE_SIZE};
use crate::{DashkeyError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::str::FromStr;

/// Format tag of hybrid payloads
pub const HYBRID_PREFIX: &str = "HYBRID:";

/// Separator between the three base64 segments
pub const SEGMENT_DELIMITER: char = ':';

/// One encrypted unit: AEAD ciphertext, the wrapped data key, and the nonce
#[derive(Clone, PartialEq, Eq)]
pub struct HybridEnvelope {
    pub encrypted_payload: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub nonce: Nonce,
}

impl HybridEnvelope {
    pub fn new(encrypted_payload: Vec<u8>, wrapped_key: Vec<u8>, nonce: Nonce) -> Self {
        Self {
            encrypted_payload,
            wrapped_key,
            nonce,
        }
    }

    /// Wire form, tagged
    pub fn serialize(&self) -> SerializedEnvelope {
        SerializedEnvelope(self.to_string())
    }

    /// Parse a wire string, with or without the `HYBRID:` tag
    pub fn parse(input: &str) -> Result<Self> {
        let body = input.strip_prefix(HYBRID_PREFIX).unwrap_or(input);

        let segments: Vec<&str> = body.split(SEGMENT_DELIMITER).collect();
        if segments.len() != 3 {
            return Err(DashkeyError::MalformedEnvelope(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let encrypted_payload = STANDARD.decode(segments[0])?;
        let wrapped_key = STANDARD.decode(segments[1])?;
        let nonce_bytes = STANDARD.decode(segments[2])?;

        let nonce: Nonce = nonce_bytes.try_into().map_err(|b: Vec<u8>| {
            DashkeyError::MalformedEnvelope(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                b.len()
            ))
        })?;

        Ok(Self {
            encrypted_payload,
            wrapped_key,
            nonce,
        })
    }
}

impl fmt::Display for HybridEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{HYBRID_PREFIX}{}{SEGMENT_DELIMITER}{}{SEGMENT_DELIMITER}{}",
            STANDARD.encode(&self.encrypted_payload),
            STANDARD.encode(&self.wrapped_key),
            STANDARD.encode(self.nonce)
        )
    }
}

impl fmt::Debug for HybridEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridEnvelope")
            .field("encrypted_payload_len", &self.encrypted_payload.len())
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("nonce", &hex::encode(self.nonce))
            .finish()
    }
}

impl FromStr for HybridEnvelope {
    type Err = DashkeyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Flat string form of an envelope, as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedEnvelope(String);

impl SerializedEnvelope {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn parse(&self) -> Result<HybridEnvelope> {
        HybridEnvelope::parse(&self.0)
    }
}

impl fmt::Display for SerializedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SerializedEnvelope> for String {
    fn from(envelope: SerializedEnvelope) -> Self {
        envelope.0
    }
}

/// How a received payload should be routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFormat<'a> {
    /// Tagged hybrid envelope; holds the text after the tag
    Hybrid(&'a str),
    /// Untagged bare base64: may be legacy direct-asymmetric ciphertext
    LegacyCandidate(Vec<u8>),
    /// Anything else is clear text
    Plain,
}

impl<'a> PayloadFormat<'a> {
    pub fn detect(payload: &'a str) -> Self {
        if let Some(body) = payload.strip_prefix(HYBRID_PREFIX) {
            return PayloadFormat::Hybrid(body);
        }
        if payload.is_empty() {
            return PayloadFormat::Plain;
        }
        match STANDARD.decode(payload) {
            Ok(bytes) => PayloadFormat::LegacyCandidate(bytes),
            Err(_) => PayloadFormat::Plain,
        }
    }
}
