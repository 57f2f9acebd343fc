//! Message records exchanged with the transport and the local store

use super::{ConversationId, ServerMessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as delivered by the network transport
///
/// `payload` is whatever the server relayed: a `HYBRID:` envelope, a legacy
/// direct-asymmetric ciphertext, or clear text sent before encryption was
/// enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub id: ServerMessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
    /// Delivered from the server's offline queue rather than live
    #[serde(default)]
    pub from_server: bool,
}

impl IncomingMessage {
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::between(self.sender_id, self.receiver_id)
    }
}

/// A message persisted locally in clear text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Server id, absent for messages not yet acknowledged
    pub server_id: Option<ServerMessageId>,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sent_by_me: bool,
}

impl StoredMessage {
    /// Record for a message received by `me`
    pub fn received(incoming: &IncomingMessage, text: impl Into<String>, me: UserId) -> Self {
        Self {
            server_id: Some(incoming.id),
            conversation_id: incoming.conversation_id(),
            sender_id: incoming.sender_id,
            receiver_id: incoming.receiver_id,
            text: text.into(),
            timestamp: incoming.timestamp,
            sent_by_me: incoming.sender_id == me,
        }
    }

    /// Record for a message authored on this device
    pub fn authored(
        server_id: Option<ServerMessageId>,
        me: UserId,
        recipient: UserId,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            server_id,
            conversation_id: ConversationId::between(me, recipient),
            sender_id: me,
            receiver_id: recipient,
            text: text.into(),
            timestamp,
            sent_by_me: true,
        }
    }
}

/// Why an outgoing message travels without end-to-end encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnprotectedReason {
    /// The key directory has no public key for the recipient
    NoRecipientKey,
}

impl std::fmt::Display for UnprotectedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnprotectedReason::NoRecipientKey => write!(f, "recipient has no registered public key"),
        }
    }
}

/// Protection applied to an outgoing payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Protection {
    Encrypted,
    Unencrypted(UnprotectedReason),
}

/// A payload ready for the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub receiver_id: UserId,
    pub payload: String,
    pub protection: Protection,
}

impl OutgoingMessage {
    pub fn is_encrypted(&self) -> bool {
        matches!(self.protection, Protection::Encrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_message_deserialize() {
        let json = r#"{
            "id": 17,
            "senderId": 7,
            "receiverId": 42,
            "payload": "HYBRID:a:b:c",
            "timestamp": "2024-05-01T10:00:00Z"
        }"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, ServerMessageId(17));
        assert!(!msg.from_server);
        assert_eq!(msg.conversation_id().to_string(), "conv_7_42");
    }

    #[test]
    fn test_received_record_marks_authorship() {
        let msg = IncomingMessage {
            id: ServerMessageId(1),
            sender_id: UserId(42),
            receiver_id: UserId(7),
            payload: "hi".to_string(),
            timestamp: Utc::now(),
            from_server: true,
        };
        let mine = StoredMessage::received(&msg, "hi", UserId(42));
        assert!(mine.sent_by_me);
        let theirs = StoredMessage::received(&msg, "hi", UserId(7));
        assert!(!theirs.sent_by_me);
        assert_eq!(theirs.server_id, Some(ServerMessageId(1)));
    }

    #[test]
    fn test_protection_serialization() {
        let json = serde_json::to_string(&Protection::Unencrypted(UnprotectedReason::NoRecipientKey))
            .unwrap();
        assert_eq!(json, r#"{"kind":"unencrypted","reason":"no_recipient_key"}"#);
        let json = serde_json::to_string(&Protection::Encrypted).unwrap();
        assert_eq!(json, r#"{"kind":"encrypted"}"#);
    }
}
