//! User and conversation identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Server-assigned numeric user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

/// Server-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMessageId(pub i64);

impl fmt::Display for ServerMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ServerMessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Prefix of every conversation identifier
pub const CONVERSATION_PREFIX: &str = "conv";

/// Separator between the prefix and the two participant ids
pub const CONVERSATION_SEPARATOR: char = '_';

/// Identifier of a one-to-one conversation
///
/// Computed from the two participants, smaller id first, so both sides
/// derive the same value. Rendered as `conv_<low>_<high>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConversationId {
    low: UserId,
    high: UserId,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid conversation id: {0}")]
pub struct InvalidConversationId(pub String);

impl ConversationId {
    /// Conversation between `a` and `b`, independent of argument order
    pub fn between(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self { low, high }
    }

    /// The two participants, smaller first
    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    /// The other participant, if `me` takes part in this conversation
    pub fn counterpart(&self, me: UserId) -> Option<UserId> {
        if me == self.low {
            Some(self.high)
        } else if me == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// Free-function form used by collaborators that only hold raw ids
pub fn conversation_id(a: UserId, b: UserId) -> ConversationId {
    ConversationId::between(a, b)
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CONVERSATION_PREFIX}{CONVERSATION_SEPARATOR}{}{CONVERSATION_SEPARATOR}{}",
            self.low, self.high
        )
    }
}

impl FromStr for ConversationId {
    type Err = InvalidConversationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidConversationId(s.to_string());
        let mut parts = s.split(CONVERSATION_SEPARATOR);
        if parts.next() != Some(CONVERSATION_PREFIX) {
            return Err(invalid());
        }
        let low: UserId = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let high: UserId = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        if parts.next().is_some() || low > high {
            return Err(invalid());
        }
        Ok(Self { low, high })
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ConversationId {
    type Error = InvalidConversationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
