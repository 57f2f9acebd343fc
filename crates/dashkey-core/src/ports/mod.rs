//! Port traits (interfaces) for the collaborators around the crypto core

pub mod directory;
pub mod plaintext;
pub mod secure_storage;

pub use directory::KeyDirectory;
pub use plaintext::PlaintextStore;
pub use secure_storage::SecureStorage;
