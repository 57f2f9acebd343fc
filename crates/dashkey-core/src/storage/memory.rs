//! In-memory adapters using DashMap
//!
//! Process-lifetime implementations of the three ports. Used by tests, by
//! the CLI's one-shot commands, and by any embedding that brings its own
//! persistence later.

use crate::ports::{KeyDirectory, PlaintextStore, SecureStorage};
use crate::Result;
use async_trait::async_trait;
use dashkey_types::{ConversationId, ServerMessageId, StoredMessage, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Secure storage held in process memory
#[derive(Default)]
pub struct MemorySecureStorage {
    data: Arc<DashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl SecureStorage for MemorySecureStorage {
    fn load(&self, alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.data.get(alias).map(|entry| entry.value().clone()))
    }

    fn store_new(&self, alias: &str, secret: &[u8]) -> Result<bool> {
        match self.data.entry(alias.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Zeroizing::new(secret.to_vec()));
                Ok(true)
            }
        }
    }

    fn remove(&self, alias: &str) -> Result<bool> {
        Ok(self.data.remove(alias).is_some())
    }

    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.data.contains_key(alias))
    }
}

/// Plaintext message history held in process memory
#[derive(Default)]
pub struct MemoryPlaintextStore {
    rows: DashMap<u64, StoredMessage>,
    by_server_id: DashMap<ServerMessageId, u64>,
    next_row: AtomicU64,
}

impl MemoryPlaintextStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_row(&self) -> u64 {
        self.next_row.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl PlaintextStore for MemoryPlaintextStore {
    async fn find_by_server_id(&self, id: ServerMessageId) -> Result<Option<StoredMessage>> {
        let Some(row) = self.by_server_id.get(&id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.rows.get(&row).map(|m| m.value().clone()))
    }

    async fn save_message(&self, message: &StoredMessage) -> Result<()> {
        match message.server_id {
            Some(server_id) => match self.by_server_id.entry(server_id) {
                Entry::Occupied(existing) => {
                    self.rows.insert(*existing.get(), message.clone());
                }
                Entry::Vacant(slot) => {
                    let row = self.allocate_row();
                    self.rows.insert(row, message.clone());
                    slot.insert(row);
                }
            },
            None => {
                let row = self.allocate_row();
                self.rows.insert(row, message.clone());
            }
        }
        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<StoredMessage>> {
        let mut found: Vec<(u64, StoredMessage)> = self
            .rows
            .iter()
            .filter(|entry| entry.value().conversation_id == *conversation)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        found.sort_by(|(row_a, a), (row_b, b)| a.timestamp.cmp(&b.timestamp).then(row_a.cmp(row_b)));
        Ok(found.into_iter().map(|(_, message)| message).collect())
    }

    async fn delete_conversation(&self, conversation: &ConversationId) -> Result<u64> {
        let doomed: Vec<u64> = self
            .rows
            .iter()
            .filter(|entry| entry.value().conversation_id == *conversation)
            .map(|entry| *entry.key())
            .collect();

        let mut deleted = 0;
        for row in doomed {
            if let Some((_, message)) = self.rows.remove(&row) {
                if let Some(server_id) = message.server_id {
                    self.by_server_id.remove(&server_id);
                }
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Key directory held in process memory
#[derive(Default)]
pub struct MemoryKeyDirectory {
    keys: DashMap<UserId, String>,
}

impl MemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn fetch_public_key(&self, user: UserId) -> Result<Option<String>> {
        Ok(self.keys.get(&user).map(|k| k.value().clone()))
    }

    async fn publish_public_key(&self, user: UserId, public_key_b64: &str) -> Result<()> {
        self.keys.insert(user, public_key_b64.to_string());
        Ok(())
    }
}
