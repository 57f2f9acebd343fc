//! Error types for the Dashkey crypto core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DashkeyError>;

#[derive(Error, Debug)]
pub enum DashkeyError {
    #[error("No active user: set one on the key context first")]
    NoActiveUser,

    #[error("Key not found under alias {0}")]
    KeyNotFound(String),

    #[error("Key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    #[error("Authentication failed: ciphertext or wrapped key did not verify")]
    AuthenticationFailed,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key directory error: {0}")]
    Directory(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashkeyError {
    /// Caller misuse of the key store; retrying will not help
    pub fn is_key_store_misuse(&self) -> bool {
        matches!(self, DashkeyError::NoActiveUser | DashkeyError::KeyNotFound(_))
    }
}

impl From<serde_json::Error> for DashkeyError {
    fn from(e: serde_json::Error) -> Self {
        DashkeyError::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for DashkeyError {
    fn from(e: base64::DecodeError) -> Self {
        DashkeyError::MalformedEnvelope(format!("invalid base64: {}", e))
    }
}
