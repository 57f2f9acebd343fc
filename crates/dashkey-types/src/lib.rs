//! Dashkey Types - Pure type definitions shared by the core and its adapters
//!
//! This crate contains only plain data types with no async runtime or crypto
//! dependencies, so collaborators (transport, persistence, UI bindings) can
//! depend on it without pulling in the crypto core.

pub mod message;
pub mod user;

pub use message::*;
pub use user::*;
