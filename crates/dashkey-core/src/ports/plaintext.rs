//! Durable local store of decrypted messages

use crate::Result;
use async_trait::async_trait;
use dashkey_types::{ConversationId, ServerMessageId, StoredMessage};

/// Local message history in clear text
#[async_trait]
pub trait PlaintextStore: Send + Sync {
    async fn find_by_server_id(&self, id: ServerMessageId) -> Result<Option<StoredMessage>>;

    /// Insert, or overwrite the row with the same server id
    async fn save_message(&self, message: &StoredMessage) -> Result<()>;

    /// All messages of a conversation, oldest first
    async fn messages_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<StoredMessage>>;

    /// Returns the number of deleted messages
    async fn delete_conversation(&self, conversation: &ConversationId) -> Result<u64>;
}
