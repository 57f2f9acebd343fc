//! Platform secure storage for key material

use crate::Result;
use zeroize::Zeroizing;

/// Alias-addressed secret storage
///
/// Implementations must make `store_new` atomic: of two concurrent calls for
/// the same alias exactly one returns `true`. Backend failures should be
/// reported as `DashkeyError::KeyStoreUnavailable`.
pub trait SecureStorage: Send + Sync {
    /// Read the secret stored under `alias`
    fn load(&self, alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Store `secret` under `alias` unless something is already there.
    /// Returns `false` when the alias was taken.
    fn store_new(&self, alias: &str, secret: &[u8]) -> Result<bool>;

    /// Erase the secret; returns whether anything was removed
    fn remove(&self, alias: &str) -> Result<bool>;

    fn contains(&self, alias: &str) -> Result<bool>;
}
