//! Dashkey Store - durable adapters for the core's ports
//!
//! - [`SqlitePlaintextStore`]: decrypted message history in SQLite
//! - [`FileSecureStorage`]: one owner-only file per key alias

pub mod db;
pub mod file;

pub use db::SqlitePlaintextStore;
pub use file::FileSecureStorage;
