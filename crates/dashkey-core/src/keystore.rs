//! Per-user asymmetric key store
//!
//! One X25519 key pair per user id, persisted through [`SecureStorage`] under
//! a deterministic alias. The private half never leaves this module: callers
//! get the public key as base64, and the hybrid engine borrows a
//! [`PrivateKeyHandle`] for the duration of one decryption.

use crate::config::CryptoConfig;
use crate::crypto::{encode_public_key, generate_key_pair, ASYMMETRIC_KEY_SIZE};
use crate::ports::SecureStorage;
use crate::{DashkeyError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use crypto_box::SecretKey;
use dashkey_types::UserId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const RECORD_VERSION: u32 = 1;

/// Number of public key bytes shown in a fingerprint
const FINGERPRINT_BYTES: usize = 8;

/// Explicit identity context passed into every key store and engine call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyContext {
    active_user: Option<UserId>,
}

impl KeyContext {
    /// A context with no active user
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user: UserId) -> Self {
        Self {
            active_user: Some(user),
        }
    }

    pub fn set_active_user(&mut self, user: UserId) {
        self.active_user = Some(user);
    }

    pub fn clear(&mut self) {
        self.active_user = None;
    }

    pub fn active_user(&self) -> Result<UserId> {
        self.active_user.ok_or(DashkeyError::NoActiveUser)
    }

    pub fn is_signed_in(&self) -> bool {
        self.active_user.is_some()
    }
}

/// Serialized form kept in secure storage
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKeyPair {
    version: u32,
    user_id: i64,
    public_key: String,
    private_key: String,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
}

impl StoredKeyPair {
    fn generate(user: UserId) -> Self {
        let secret = generate_key_pair();
        let private = Zeroizing::new(secret.to_bytes());
        Self {
            version: RECORD_VERSION,
            user_id: user.get(),
            public_key: encode_public_key(&secret.public_key()),
            private_key: STANDARD.encode(&private[..]),
            created_at: Utc::now(),
        }
    }

    fn secret_key(&self) -> Result<SecretKey> {
        let decoded = Zeroizing::new(STANDARD.decode(&self.private_key).map_err(|_| {
            DashkeyError::KeyStoreUnavailable("stored private key is not valid base64".to_string())
        })?);
        if decoded.len() != ASYMMETRIC_KEY_SIZE {
            return Err(DashkeyError::KeyStoreUnavailable(format!(
                "stored private key has {} bytes",
                decoded.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; ASYMMETRIC_KEY_SIZE]);
        bytes.copy_from_slice(&decoded);
        Ok(SecretKey::from(*bytes))
    }
}

/// Borrowed access to a user's private key for one operation
pub(crate) struct PrivateKeyHandle {
    secret: SecretKey,
}

impl PrivateKeyHandle {
    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

/// Non-secret description of a stored key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub user_id: UserId,
    pub alias: String,
    pub public_key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Short hex fingerprint of a base64 public key, for logs
pub fn public_key_fingerprint(public_key_b64: &str) -> String {
    match STANDARD.decode(public_key_b64.trim()) {
        Ok(bytes) if bytes.len() >= FINGERPRINT_BYTES => hex::encode(&bytes[..FINGERPRINT_BYTES]),
        _ => "invalid".to_string(),
    }
}

/// Key pair lifecycle over a secure storage backend
pub struct KeyStore {
    storage: Arc<dyn SecureStorage>,
    config: CryptoConfig,
    public_keys: DashMap<UserId, String>,
}

impl KeyStore {
    pub fn new(storage: Arc<dyn SecureStorage>, config: CryptoConfig) -> Self {
        Self {
            storage,
            config,
            public_keys: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    /// Storage alias for a user
    pub fn alias_for(&self, user: UserId) -> String {
        format!("{}{}", self.config.alias_prefix, user)
    }

    /// Generate and persist a key pair unless one exists; returns the public key
    pub fn ensure_keys_for_user(&self, user: UserId) -> Result<String> {
        let alias = self.alias_for(user);

        if let Some(record) = self.load_record(&alias)? {
            let public_key = record.public_key.clone();
            self.public_keys.insert(user, public_key.clone());
            return Ok(public_key);
        }

        let record = StoredKeyPair::generate(user);
        let encoded = Zeroizing::new(serde_json::to_vec(&record)?);

        let public_key = if self.storage.store_new(&alias, &encoded)? {
            tracing::info!(
                user = %user,
                fingerprint = %public_key_fingerprint(&record.public_key),
                "Generated new key pair"
            );
            record.public_key.clone()
        } else {
            // Lost a race with another caller; theirs is authoritative
            tracing::debug!(user = %user, "Key pair created concurrently, reading it back");
            self.load_record(&alias)?
                .map(|winner| winner.public_key.clone())
                .ok_or_else(|| DashkeyError::KeyNotFound(alias.clone()))?
        };

        self.public_keys.insert(user, public_key.clone());
        Ok(public_key)
    }

    /// Base64 public key of the context's user
    pub fn current_user_public_key(&self, ctx: &KeyContext) -> Result<String> {
        let user = ctx.active_user()?;
        if let Some(cached) = self.public_keys.get(&user) {
            return Ok(cached.clone());
        }

        let alias = self.alias_for(user);
        let record = self
            .load_record(&alias)?
            .ok_or(DashkeyError::KeyNotFound(alias))?;
        let public_key = record.public_key.clone();
        self.public_keys.insert(user, public_key.clone());
        Ok(public_key)
    }

    /// Whether a usable private key exists for the context's user
    pub fn has_private_key(&self, ctx: &KeyContext) -> Result<bool> {
        let alias = self.alias_for(ctx.active_user()?);
        match self.read_record(&alias)? {
            Some(Ok(record)) => Ok(record.secret_key().is_ok()),
            Some(Err(e)) => {
                tracing::warn!(alias = %alias, error = %e, "Stored key record does not decode");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Whether any record exists under the context user's alias
    pub fn has_keys(&self, ctx: &KeyContext) -> Result<bool> {
        let alias = self.alias_for(ctx.active_user()?);
        self.storage.contains(&alias)
    }

    /// Erase the context user's key pair. Irreversible.
    pub fn delete_keys(&self, ctx: &KeyContext) -> Result<bool> {
        let user = ctx.active_user()?;
        let alias = self.alias_for(user);
        self.public_keys.remove(&user);
        let removed = self.storage.remove(&alias)?;
        if removed {
            tracing::info!(user = %user, "Deleted key pair");
        }
        Ok(removed)
    }

    pub fn key_summary(&self, ctx: &KeyContext) -> Result<Option<KeySummary>> {
        let user = ctx.active_user()?;
        let alias = self.alias_for(user);
        Ok(self.load_record(&alias)?.map(|record| KeySummary {
            user_id: user,
            fingerprint: public_key_fingerprint(&record.public_key),
            public_key: record.public_key.clone(),
            created_at: record.created_at,
            alias,
        }))
    }

    pub(crate) fn private_key(&self, ctx: &KeyContext) -> Result<PrivateKeyHandle> {
        let alias = self.alias_for(ctx.active_user()?);
        let record = self
            .load_record(&alias)?
            .ok_or(DashkeyError::KeyNotFound(alias))?;
        Ok(PrivateKeyHandle {
            secret: record.secret_key()?,
        })
    }

    fn load_record(&self, alias: &str) -> Result<Option<StoredKeyPair>> {
        match self.read_record(alias)? {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(DashkeyError::KeyStoreUnavailable(format!(
                "corrupt key record under {}: {}",
                alias, e
            ))),
            None => Ok(None),
        }
    }

    /// Outer error is the backend, inner is the record's encoding
    fn read_record(
        &self,
        alias: &str,
    ) -> Result<Option<std::result::Result<StoredKeyPair, serde_json::Error>>> {
        let Some(bytes) = self.storage.load(alias)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemorySecureStorage;

    fn store() -> KeyStore {
        KeyStore::new(Arc::new(MemorySecureStorage::new()), CryptoConfig::default())
    }

    #[test]
    fn test_ensure_keys_is_idempotent_per_user() {
        let keys = store();
        let first = keys.ensure_keys_for_user(UserId(42)).unwrap();
        let second = keys.ensure_keys_for_user(UserId(42)).unwrap();
        let other = keys.ensure_keys_for_user(UserId(43)).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(keys.alias_for(UserId(42)), "DashKeyE2EEKey_42");
    }

    #[test]
    fn test_racing_ensure_creates_one_key_pair() {
        let keys = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = keys.clone();
                std::thread::spawn(move || keys.ensure_keys_for_user(UserId(42)).unwrap())
            })
            .collect();

        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(
            keys.current_user_public_key(&KeyContext::for_user(UserId(42))).unwrap(),
            results[0]
        );
    }

    #[test]
    fn test_requires_active_user() {
        let keys = store();
        let ctx = KeyContext::new();
        assert!(matches!(
            keys.current_user_public_key(&ctx),
            Err(DashkeyError::NoActiveUser)
        ));
        assert!(matches!(keys.has_private_key(&ctx), Err(DashkeyError::NoActiveUser)));
        assert!(matches!(keys.delete_keys(&ctx), Err(DashkeyError::NoActiveUser)));
    }

    #[test]
    fn test_missing_key_is_key_not_found() {
        let keys = store();
        let ctx = KeyContext::for_user(UserId(7));
        assert!(matches!(
            keys.current_user_public_key(&ctx),
            Err(DashkeyError::KeyNotFound(alias)) if alias == "DashKeyE2EEKey_7"
        ));
        assert!(!keys.has_private_key(&ctx).unwrap());
        assert!(!keys.has_keys(&ctx).unwrap());
    }

    #[test]
    fn test_context_switch_isolates_users() {
        let keys = store();
        let pk_a = keys.ensure_keys_for_user(UserId(1)).unwrap();
        let pk_b = keys.ensure_keys_for_user(UserId(2)).unwrap();

        let mut ctx = KeyContext::for_user(UserId(1));
        assert_eq!(keys.current_user_public_key(&ctx).unwrap(), pk_a);
        ctx.set_active_user(UserId(2));
        assert_eq!(keys.current_user_public_key(&ctx).unwrap(), pk_b);
        ctx.clear();
        assert!(!ctx.is_signed_in());
    }

    #[test]
    fn test_delete_keys_clears_record_and_cache() {
        let keys = store();
        let ctx = KeyContext::for_user(UserId(42));
        let before = keys.ensure_keys_for_user(UserId(42)).unwrap();
        assert!(keys.has_private_key(&ctx).unwrap());

        assert!(keys.delete_keys(&ctx).unwrap());
        assert!(!keys.delete_keys(&ctx).unwrap());
        assert!(!keys.has_keys(&ctx).unwrap());
        assert!(matches!(
            keys.current_user_public_key(&ctx),
            Err(DashkeyError::KeyNotFound(_))
        ));

        let after = keys.ensure_keys_for_user(UserId(42)).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_corrupt_record_is_key_store_unavailable() {
        let storage = Arc::new(MemorySecureStorage::new());
        storage.store_new("DashKeyE2EEKey_5", b"not json").unwrap();
        let keys = KeyStore::new(storage, CryptoConfig::default());
        let ctx = KeyContext::for_user(UserId(5));

        assert!(matches!(
            keys.current_user_public_key(&ctx),
            Err(DashkeyError::KeyStoreUnavailable(_))
        ));
        assert!(!keys.has_private_key(&ctx).unwrap());
        assert!(keys.has_keys(&ctx).unwrap());
    }

    struct UnreadableStorage;

    impl SecureStorage for UnreadableStorage {
        fn load(&self, _alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            Err(DashkeyError::KeyStoreUnavailable("permission denied".to_string()))
        }

        fn store_new(&self, _alias: &str, _secret: &[u8]) -> Result<bool> {
            Ok(false)
        }

        fn remove(&self, _alias: &str) -> Result<bool> {
            Ok(false)
        }

        fn contains(&self, _alias: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_backend_failure_is_not_reported_as_missing_key() {
        let keys = KeyStore::new(Arc::new(UnreadableStorage), CryptoConfig::default());
        let ctx = KeyContext::for_user(UserId(5));

        assert!(matches!(
            keys.has_private_key(&ctx),
            Err(DashkeyError::KeyStoreUnavailable(_))
        ));
    }

    #[test]
    fn test_summary_and_fingerprint() {
        let keys = store();
        let ctx = KeyContext::for_user(UserId(9));
        assert!(keys.key_summary(&ctx).unwrap().is_none());

        let pk = keys.ensure_keys_for_user(UserId(9)).unwrap();
        let summary = keys.key_summary(&ctx).unwrap().unwrap();
        assert_eq!(summary.public_key, pk);
        assert_eq!(summary.fingerprint.len(), FINGERPRINT_BYTES * 2);
        assert_eq!(summary.fingerprint, public_key_fingerprint(&pk));
        assert_eq!(public_key_fingerprint("???"), "invalid");
    }
}
