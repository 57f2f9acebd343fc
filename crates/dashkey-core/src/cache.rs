//! Plaintext cache and message resolution
//!
//! Decides what text to show for an incoming message. Lookup order:
//!
//! 1. the durable local store (already processed earlier)
//! 2. messages this device authored during the session
//! 3. decryption through the hybrid engine
//!
//! Anything resolved by steps 2 and 3 is written back to the durable store
//! under the conversation id, except payloads that failed authentication or
//! parsing: those are returned raw and retried next time. Our own sent
//! messages cannot be opened here once the authored cache is gone; they are
//! reported separately so they are not mistaken for tampering.

use crate::crypto::{DecryptOutcome, HybridEngine};
use crate::keystore::{KeyContext, KeyStore};
use crate::ports::PlaintextStore;
use crate::Result;
use dashkey_types::{IncomingMessage, ServerMessageId, StoredMessage, UserId};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// Why a payload could not be turned into readable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum UndecryptableReason {
    AuthenticationFailed,
    MalformedEnvelope(String),
    /// Our own message, sealed to the peer, seen after the authored cache was cleared
    NotAddressedToThisDevice,
}

/// Where the text of a resolved message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    DurableStore,
    AuthoredCache,
    Decrypted,
    AlreadyPlaintext,
    /// Text is the raw payload; nothing was persisted
    Undecryptable(UndecryptableReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMessage {
    pub message: StoredMessage,
    pub source: ResolutionSource,
}

impl ResolvedMessage {
    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self.source, ResolutionSource::Undecryptable(_))
    }
}

/// Session-owned plaintext cache in front of the hybrid engine
pub struct MessageCache {
    engine: Arc<HybridEngine>,
    keys: Arc<KeyStore>,
    store: Arc<dyn PlaintextStore>,
    authored: DashMap<ServerMessageId, String>,
}

impl MessageCache {
    pub fn new(
        engine: Arc<HybridEngine>,
        keys: Arc<KeyStore>,
        store: Arc<dyn PlaintextStore>,
    ) -> Self {
        Self {
            engine,
            keys,
            store,
            authored: DashMap::new(),
        }
    }

    /// Remember the clear text of a message this device just sent
    pub fn remember_authored(&self, id: ServerMessageId, text: impl Into<String>) {
        self.authored.insert(id, text.into());
    }

    pub fn authored_len(&self) -> usize {
        self.authored.len()
    }

    pub fn clear_authored(&self) {
        self.authored.clear();
    }

    pub async fn resolve(
        &self,
        ctx: &KeyContext,
        incoming: &IncomingMessage,
    ) -> Result<ResolvedMessage> {
        let me = ctx.active_user()?;

        if let Some(stored) = self.store.find_by_server_id(incoming.id).await? {
            tracing::trace!(message_id = %incoming.id, "Resolved from durable store");
            return Ok(ResolvedMessage {
                message: stored,
                source: ResolutionSource::DurableStore,
            });
        }

        let authored = self.authored.get(&incoming.id).map(|t| t.value().clone());
        let (text, source) = match authored {
            Some(text) => (text, ResolutionSource::AuthoredCache),
            None => match self.engine.decrypt_from_sender(&self.keys, ctx, &incoming.payload)? {
                DecryptOutcome::Decrypted(text) => (text, ResolutionSource::Decrypted),
                DecryptOutcome::AlreadyPlaintext(text) => (text, ResolutionSource::AlreadyPlaintext),
                DecryptOutcome::AuthenticationFailed => {
                    let reason = if incoming.sender_id == me && incoming.receiver_id != me {
                        UndecryptableReason::NotAddressedToThisDevice
                    } else {
                        UndecryptableReason::AuthenticationFailed
                    };
                    return Ok(self.undecryptable(incoming, me, reason));
                }
                DecryptOutcome::MalformedEnvelope(reason) => {
                    return Ok(self.undecryptable(
                        incoming,
                        me,
                        UndecryptableReason::MalformedEnvelope(reason),
                    ));
                }
            },
        };

        let message = StoredMessage::received(incoming, text, me);
        if let Err(e) = self.store.save_message(&message).await {
            tracing::warn!(message_id = %incoming.id, error = %e, "Failed to persist resolved message");
        }

        Ok(ResolvedMessage { message, source })
    }

    /// Resolve a page of history in order
    pub async fn resolve_all(
        &self,
        ctx: &KeyContext,
        messages: &[IncomingMessage],
    ) -> Result<Vec<ResolvedMessage>> {
        let mut resolved = Vec::with_capacity(messages.len());
        for message in messages {
            resolved.push(self.resolve(ctx, message).await?);
        }
        Ok(resolved)
    }

    fn undecryptable(
        &self,
        incoming: &IncomingMessage,
        me: UserId,
        reason: UndecryptableReason,
    ) -> ResolvedMessage {
        if reason == UndecryptableReason::NotAddressedToThisDevice {
            tracing::debug!(message_id = %incoming.id, "Own sent message is not readable here");
        } else {
            tracing::warn!(
                message_id = %incoming.id,
                sender = %incoming.sender_id,
                reason = ?reason,
                "Message could not be decrypted"
            );
        }
        ResolvedMessage {
            message: StoredMessage::received(incoming, incoming.payload.clone(), me),
            source: ResolutionSource::Undecryptable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CryptoConfig;
    use crate::storage::memory::{MemoryPlaintextStore, MemorySecureStorage};
    use chrono::Utc;
    use dashkey_types::ConversationId;

    const ME: UserId = UserId(42);
    const PEER: UserId = UserId(7);

    struct Fixture {
        cache: MessageCache,
        store: Arc<MemoryPlaintextStore>,
        engine: Arc<HybridEngine>,
        ctx: KeyContext,
        my_key: String,
    }

    fn fixture() -> Fixture {
        let config = CryptoConfig::default();
        let keys = Arc::new(KeyStore::new(Arc::new(MemorySecureStorage::new()), config.clone()));
        let my_key = keys.ensure_keys_for_user(ME).unwrap();
        let engine = Arc::new(HybridEngine::new(&config));
        let store = Arc::new(MemoryPlaintextStore::new());
        Fixture {
            cache: MessageCache::new(engine.clone(), keys, store.clone()),
            store,
            engine,
            ctx: KeyContext::for_user(ME),
            my_key,
        }
    }

    fn incoming(id: i64, from: UserId, to: UserId, payload: &str) -> IncomingMessage {
        IncomingMessage {
            id: ServerMessageId(id),
            sender_id: from,
            receiver_id: to,
            payload: payload.to_string(),
            timestamp: Utc::now(),
            from_server: false,
        }
    }

    #[tokio::test]
    async fn test_durable_store_wins_over_decryption() {
        let f = fixture();
        let env = f.engine.encrypt_for_recipient("B", &f.my_key).unwrap();
        let msg = incoming(1, PEER, ME, env.as_str());

        f.store
            .save_message(&StoredMessage::received(&msg, "A", ME))
            .await
            .unwrap();

        let resolved = f.cache.resolve(&f.ctx, &msg).await.unwrap();
        assert_eq!(resolved.text(), "A");
        assert_eq!(resolved.source, ResolutionSource::DurableStore);
    }

    #[tokio::test]
    async fn test_authored_cache_skips_decryption() {
        let f = fixture();
        // Own sent message comes back encrypted to the peer; we cannot open it
        let peer_engine = HybridEngine::default();
        let other_keys = KeyStore::new(Arc::new(MemorySecureStorage::new()), CryptoConfig::default());
        let peer_pk = other_keys.ensure_keys_for_user(PEER).unwrap();
        let env = peer_engine.encrypt_for_recipient("my words", &peer_pk).unwrap();

        f.cache.remember_authored(ServerMessageId(2), "my words");
        let msg = incoming(2, ME, PEER, env.as_str());
        let resolved = f.cache.resolve(&f.ctx, &msg).await.unwrap();

        assert_eq!(resolved.text(), "my words");
        assert_eq!(resolved.source, ResolutionSource::AuthoredCache);
        assert!(resolved.message.sent_by_me);
        assert!(f.store.find_by_server_id(ServerMessageId(2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_decrypted_message_is_written_back() {
        let f = fixture();
        let env = f.engine.encrypt_for_recipient("hello 42", &f.my_key).unwrap();
        let msg = incoming(3, PEER, ME, env.as_str());

        let first = f.cache.resolve(&f.ctx, &msg).await.unwrap();
        assert_eq!(first.source, ResolutionSource::Decrypted);

        let stored = f.store.find_by_server_id(ServerMessageId(3)).await.unwrap().unwrap();
        assert_eq!(stored.text, "hello 42");
        assert_eq!(stored.conversation_id, ConversationId::between(ME, PEER));

        let second = f.cache.resolve(&f.ctx, &msg).await.unwrap();
        assert_eq!(second.source, ResolutionSource::DurableStore);
        assert_eq!(second.text(), "hello 42");
    }

    #[tokio::test]
    async fn test_plaintext_payload_is_kept() {
        let f = fixture();
        let msg = incoming(4, PEER, ME, "sent before encryption");
        let resolved = f.cache.resolve(&f.ctx, &msg).await.unwrap();
        assert_eq!(resolved.source, ResolutionSource::AlreadyPlaintext);
        assert_eq!(resolved.text(), "sent before encryption");
    }

    #[tokio::test]
    async fn test_failed_authentication_is_not_persisted() {
        let f = fixture();
        let msg = incoming(5, PEER, ME, "HYBRID:AAAA:AAAA:AAAAAAAAAAAAAAAA");
        let resolved = f.cache.resolve(&f.ctx, &msg).await.unwrap();

        assert_eq!(
            resolved.source,
            ResolutionSource::Undecryptable(UndecryptableReason::AuthenticationFailed)
        );
        assert!(!resolved.is_readable());
        assert_eq!(resolved.text(), msg.payload);
        assert!(f.store.find_by_server_id(ServerMessageId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_own_message_after_cache_cleared_is_not_tampering() {
        let f = fixture();
        let other_keys = KeyStore::new(Arc::new(MemorySecureStorage::new()), CryptoConfig::default());
        let peer_pk = other_keys.ensure_keys_for_user(PEER).unwrap();
        let env = f.engine.encrypt_for_recipient("from a past session", &peer_pk).unwrap();

        let msg = incoming(6, ME, PEER, env.as_str());
        let resolved = f.cache.resolve(&f.ctx, &msg).await.unwrap();

        assert_eq!(
            resolved.source,
            ResolutionSource::Undecryptable(UndecryptableReason::NotAddressedToThisDevice)
        );
        assert!(!resolved.is_readable());
        assert!(f.store.find_by_server_id(ServerMessageId(6)).await.unwrap().is_none());

        // A corrupted message from the peer is still reported as such
        let forged = incoming(7, PEER, ME, env.as_str());
        let resolved = f.cache.resolve(&f.ctx, &forged).await.unwrap();
        assert_eq!(
            resolved.source,
            ResolutionSource::Undecryptable(UndecryptableReason::AuthenticationFailed)
        );
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_order() {
        let f = fixture();
        let env = f.engine.encrypt_for_recipient("second", &f.my_key).unwrap();
        let page = vec![
            incoming(10, PEER, ME, "first"),
            incoming(11, PEER, ME, env.as_str()),
            incoming(12, PEER, ME, "HYBRID:bad"),
        ];
        let resolved = f.cache.resolve_all(&f.ctx, &page).await.unwrap();
        let texts: Vec<&str> = resolved.iter().map(|r| r.text()).collect();
        assert_eq!(texts, vec!["first", "second", "HYBRID:bad"]);
        assert!(matches!(
            resolved[2].source,
            ResolutionSource::Undecryptable(UndecryptableReason::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_active_user() {
        let f = fixture();
        let msg = incoming(1, PEER, ME, "x");
        assert!(f.cache.resolve(&KeyContext::new(), &msg).await.is_err());
    }
}
