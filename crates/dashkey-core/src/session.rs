//! Signed-in messaging session
//!
//! Ties the key store, engine, cache and the two remote/local collaborators
//! to one explicit [`KeyContext`]: provisioning keys at sign-in, protecting
//! outgoing text, and resolving what comes back.

use crate::cache::{MessageCache, ResolvedMessage};
use crate::config::CryptoConfig;
use crate::crypto::HybridEngine;
use crate::keystore::{public_key_fingerprint, KeyContext, KeyStore};
use crate::ports::{KeyDirectory, PlaintextStore, SecureStorage};
use crate::Result;
use chrono::{DateTime, Utc};
use dashkey_types::{
    ConversationId, IncomingMessage, OutgoingMessage, Protection, ServerMessageId, StoredMessage,
    UnprotectedReason, UserId,
};
use serde::Serialize;
use std::sync::Arc;

/// What happened to the user's keys during sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub user_id: UserId,
    pub public_key: String,
    pub fingerprint: String,
    /// The public key was uploaded to the directory
    pub published: bool,
    /// The directory held a different key, which was replaced
    pub replaced_remote: bool,
}

pub struct SecureSession {
    ctx: KeyContext,
    keys: Arc<KeyStore>,
    engine: Arc<HybridEngine>,
    cache: MessageCache,
    store: Arc<dyn PlaintextStore>,
    directory: Arc<dyn KeyDirectory>,
}

impl SecureSession {
    pub fn new(
        config: CryptoConfig,
        secure_storage: Arc<dyn SecureStorage>,
        store: Arc<dyn PlaintextStore>,
        directory: Arc<dyn KeyDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(HybridEngine::new(&config));
        let keys = Arc::new(KeyStore::new(secure_storage, config));
        let cache = MessageCache::new(engine.clone(), keys.clone(), store.clone());

        Ok(Self {
            ctx: KeyContext::new(),
            keys,
            engine,
            cache,
            store,
            directory,
        })
    }

    pub fn context(&self) -> &KeyContext {
        &self.ctx
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn engine(&self) -> &HybridEngine {
        &self.engine
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Switch to `user` without provisioning keys or contacting the directory
    pub fn resume(&mut self, user: UserId) {
        self.cache.clear_authored();
        self.ctx.set_active_user(user);
    }

    /// Activate `user`, make sure a key pair exists, and publish its public
    /// key when the directory does not already have it
    pub async fn sign_in(&mut self, user: UserId) -> Result<ProvisionReport> {
        self.cache.clear_authored();
        self.ctx.set_active_user(user);
        let public_key = self.keys.ensure_keys_for_user(user)?;
        let fingerprint = public_key_fingerprint(&public_key);

        let remote = self.directory.fetch_public_key(user).await?;
        let (published, replaced_remote) = match remote.as_deref() {
            Some(existing) if existing == public_key => (false, false),
            Some(existing) => {
                // Messages addressed to the old key stay unreadable on this device
                tracing::warn!(
                    user = %user,
                    remote = %public_key_fingerprint(existing),
                    local = %fingerprint,
                    "Directory holds a different public key, replacing it"
                );
                self.directory.publish_public_key(user, &public_key).await?;
                (true, true)
            }
            None => {
                self.directory.publish_public_key(user, &public_key).await?;
                (true, false)
            }
        };

        tracing::info!(user = %user, fingerprint = %fingerprint, published, "Signed in");
        Ok(ProvisionReport {
            user_id: user,
            public_key,
            fingerprint,
            published,
            replaced_remote,
        })
    }

    /// Encrypt `plaintext` for `recipient`, or fall back to clear text
    /// (visibly) when the recipient has no registered key
    pub async fn prepare_outgoing(&self, recipient: UserId, plaintext: &str) -> Result<OutgoingMessage> {
        self.ctx.active_user()?;

        match self.directory.fetch_public_key(recipient).await? {
            Some(public_key) => {
                let envelope = self.engine.encrypt_for_recipient(plaintext, &public_key)?;
                Ok(OutgoingMessage {
                    receiver_id: recipient,
                    payload: envelope.into_string(),
                    protection: Protection::Encrypted,
                })
            }
            None => {
                tracing::warn!(recipient = %recipient, "No public key registered, sending unencrypted");
                Ok(OutgoingMessage {
                    receiver_id: recipient,
                    payload: plaintext.to_string(),
                    protection: Protection::Unencrypted(UnprotectedReason::NoRecipientKey),
                })
            }
        }
    }

    /// Remember a sent message's clear text and persist it locally
    pub async fn record_sent(
        &self,
        server_id: Option<ServerMessageId>,
        recipient: UserId,
        plaintext: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredMessage> {
        let me = self.ctx.active_user()?;
        if let Some(id) = server_id {
            self.cache.remember_authored(id, plaintext);
        }
        let message = StoredMessage::authored(server_id, me, recipient, plaintext, timestamp);
        self.store.save_message(&message).await?;
        Ok(message)
    }

    pub async fn receive(&self, incoming: &IncomingMessage) -> Result<ResolvedMessage> {
        self.cache.resolve(&self.ctx, incoming).await
    }

    pub async fn receive_all(&self, messages: &[IncomingMessage]) -> Result<Vec<ResolvedMessage>> {
        self.cache.resolve_all(&self.ctx, messages).await
    }

    /// Local history with another user, oldest first
    pub async fn history(&self, with: UserId) -> Result<Vec<StoredMessage>> {
        let me = self.ctx.active_user()?;
        self.store
            .messages_for_conversation(&ConversationId::between(me, with))
            .await
    }

    pub async fn clear_history(&self, with: UserId) -> Result<u64> {
        let me = self.ctx.active_user()?;
        let deleted = self
            .store
            .delete_conversation(&ConversationId::between(me, with))
            .await?;
        tracing::debug!(with = %with, deleted, "Cleared conversation history");
        Ok(deleted)
    }

    /// Forget the active user and the session cache; keys stay on the device
    pub fn sign_out(&mut self) {
        if let Ok(user) = self.ctx.active_user() {
            tracing::info!(user = %user, "Signed out");
        }
        self.ctx.clear();
        self.cache.clear_authored();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResolutionSource;
    use crate::storage::memory::{MemoryKeyDirectory, MemoryPlaintextStore, MemorySecureStorage};
    use crate::DashkeyError;

    struct Device {
        session: SecureSession,
    }

    fn device(directory: Arc<MemoryKeyDirectory>) -> Device {
        Device {
            session: SecureSession::new(
                CryptoConfig::default(),
                Arc::new(MemorySecureStorage::new()),
                Arc::new(MemoryPlaintextStore::new()),
                directory,
            )
            .unwrap(),
        }
    }

    fn delivered(out: &OutgoingMessage, id: i64, from: UserId) -> IncomingMessage {
        IncomingMessage {
            id: ServerMessageId(id),
            sender_id: from,
            receiver_id: out.receiver_id,
            payload: out.payload.clone(),
            timestamp: Utc::now(),
            from_server: false,
        }
    }

    #[tokio::test]
    async fn test_sign_in_publishes_once() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory.clone());

        let first = alice.session.sign_in(UserId(1)).await.unwrap();
        assert!(first.published);
        assert!(!first.replaced_remote);
        assert_eq!(
            directory.fetch_public_key(UserId(1)).await.unwrap(),
            Some(first.public_key.clone())
        );

        let second = alice.session.sign_in(UserId(1)).await.unwrap();
        assert!(!second.published);
        assert_eq!(second.public_key, first.public_key);
    }

    #[tokio::test]
    async fn test_sign_in_replaces_stale_remote_key() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        directory.publish_public_key(UserId(1), "c3RhbGU=").await.unwrap();
        let mut alice = device(directory);

        let report = alice.session.sign_in(UserId(1)).await.unwrap();
        assert!(report.published);
        assert!(report.replaced_remote);
    }

    #[tokio::test]
    async fn test_end_to_end_between_devices() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory.clone());
        let mut bob = device(directory);
        alice.session.sign_in(UserId(1)).await.unwrap();
        bob.session.sign_in(UserId(2)).await.unwrap();

        let out = alice.session.prepare_outgoing(UserId(2), "hi bob").await.unwrap();
        assert!(out.is_encrypted());
        assert!(out.payload.starts_with("HYBRID:"));

        let received = bob.session.receive(&delivered(&out, 100, UserId(1))).await.unwrap();
        assert_eq!(received.text(), "hi bob");
        assert_eq!(received.source, ResolutionSource::Decrypted);

        let history = bob.session.history(UserId(1)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].sent_by_me);
    }

    #[tokio::test]
    async fn test_missing_recipient_key_is_observable() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory);
        alice.session.sign_in(UserId(1)).await.unwrap();

        let out = alice.session.prepare_outgoing(UserId(99), "plain").await.unwrap();
        assert!(!out.is_encrypted());
        assert_eq!(
            out.protection,
            Protection::Unencrypted(UnprotectedReason::NoRecipientKey)
        );
        assert_eq!(out.payload, "plain");
    }

    #[tokio::test]
    async fn test_own_sent_message_resolves_locally() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory.clone());
        let mut bob = device(directory);
        alice.session.sign_in(UserId(1)).await.unwrap();
        bob.session.sign_in(UserId(2)).await.unwrap();

        let out = alice.session.prepare_outgoing(UserId(2), "mine").await.unwrap();
        alice
            .session
            .record_sent(Some(ServerMessageId(7)), UserId(2), "mine", Utc::now())
            .await
            .unwrap();

        let echoed = alice.session.receive(&delivered(&out, 7, UserId(1))).await.unwrap();
        assert_eq!(echoed.text(), "mine");
        assert_eq!(echoed.source, ResolutionSource::DurableStore);
        assert!(echoed.message.sent_by_me);
    }

    #[tokio::test]
    async fn test_clear_history_and_sign_out() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory);
        alice.session.sign_in(UserId(1)).await.unwrap();
        alice
            .session
            .record_sent(Some(ServerMessageId(1)), UserId(2), "a", Utc::now())
            .await
            .unwrap();
        alice
            .session
            .record_sent(None, UserId(2), "b", Utc::now())
            .await
            .unwrap();

        assert_eq!(alice.session.clear_history(UserId(2)).await.unwrap(), 2);
        assert!(alice.session.history(UserId(2)).await.unwrap().is_empty());

        alice.session.sign_out();
        assert_eq!(alice.session.cache().authored_len(), 0);
        assert!(matches!(
            alice.session.history(UserId(2)).await,
            Err(DashkeyError::NoActiveUser)
        ));
        // Keys survive sign-out
        assert!(alice
            .session
            .keys()
            .has_private_key(&KeyContext::for_user(UserId(1)))
            .unwrap());
    }

    #[tokio::test]
    async fn test_resume_skips_directory() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        let mut alice = device(directory.clone());
        alice.session.keys().ensure_keys_for_user(UserId(1)).unwrap();

        alice.session.resume(UserId(1));
        assert_eq!(alice.session.context().active_user().unwrap(), UserId(1));
        assert!(directory.fetch_public_key(UserId(1)).await.unwrap().is_none());
        assert!(alice.session.history(UserId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = CryptoConfig {
            wrap_schemes: vec![],
            ..CryptoConfig::default()
        };
        let result = SecureSession::new(
            config,
            Arc::new(MemorySecureStorage::new()),
            Arc::new(MemoryPlaintextStore::new()),
            Arc::new(MemoryKeyDirectory::new()),
        );
        assert!(matches!(result, Err(DashkeyError::InvalidConfig(_))));
    }
}
