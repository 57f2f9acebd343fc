//! Built-in adapters for the core's ports

pub mod memory;

pub use memory::{MemoryKeyDirectory, MemoryPlaintextStore, MemorySecureStorage};
