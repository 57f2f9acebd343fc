//! Dashkey Core Library
//!
//! Hybrid end-to-end encryption for one-to-one messaging: per-user key
//! store, AES-256-GCM payload sealing with X25519 key wrapping, the envelope
//! wire format, and the plaintext cache that decides what a device shows.

// Re-export pure types from dashkey-types
pub use dashkey_types::*;

pub mod cache;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod keystore;
pub mod ports;
pub mod session;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{MessageCache, ResolutionSource, ResolvedMessage, UndecryptableReason};
pub use config::CryptoConfig;
pub use crypto::{DecryptOutcome, HybridEngine, KeyWrapScheme};
pub use envelope::{HybridEnvelope, SerializedEnvelope, HYBRID_PREFIX};
pub use error::{DashkeyError, Result};
pub use keystore::{public_key_fingerprint, KeyContext, KeyStore, KeySummary};
pub use session::{ProvisionReport, SecureSession};
