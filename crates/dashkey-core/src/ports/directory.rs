//! Remote public key directory

use crate::Result;
use async_trait::async_trait;
use dashkey_types::UserId;

/// Public key lookup and registration on the server
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// `None` when the user has not registered a key; that is not an error
    async fn fetch_public_key(&self, user: UserId) -> Result<Option<String>>;

    async fn publish_public_key(&self, user: UserId, public_key_b64: &str) -> Result<()>;
}
