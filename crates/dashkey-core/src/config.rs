//! Crypto core configuration

use crate::crypto::KeyWrapScheme;
use crate::{DashkeyError, Result};
use serde::{Deserialize, Serialize};

/// Default prefix for per-user key aliases
pub const DEFAULT_ALIAS_PREFIX: &str = "DashKeyE2EEKey_";

/// Settings for the key store and hybrid engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Prefix joined with the user id to form the storage alias
    pub alias_prefix: String,
    /// Key wrap schemes in preference order. The first one wraps new
    /// envelopes; all of them are tried when unwrapping.
    pub wrap_schemes: Vec<KeyWrapScheme>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            wrap_schemes: vec![KeyWrapScheme::SealedBox, KeyWrapScheme::EphemeralBox],
        }
    }
}

impl CryptoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alias_prefix.is_empty() {
            return Err(DashkeyError::InvalidConfig(
                "alias_prefix must not be empty".to_string(),
            ));
        }
        if self.wrap_schemes.is_empty() {
            return Err(DashkeyError::InvalidConfig(
                "at least one wrap scheme is required".to_string(),
            ));
        }
        for (i, scheme) in self.wrap_schemes.iter().enumerate() {
            if self.wrap_schemes[..i].contains(scheme) {
                return Err(DashkeyError::InvalidConfig(format!(
                    "wrap scheme {} listed twice",
                    scheme
                )));
            }
        }
        Ok(())
    }

    /// Scheme used for new envelopes
    pub fn preferred_scheme(&self) -> KeyWrapScheme {
        self.wrap_schemes
            .first()
            .copied()
            .unwrap_or(KeyWrapScheme::SealedBox)
    }
}
