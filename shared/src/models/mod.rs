//! Data models
//!
//! Shared between the engine (boh-core) and API consumers.
//! Entity IDs are strings (uuid or generated sequence codes); all money
//! and quantity fields are `rust_decimal::Decimal`.

pub mod inventory;
pub mod kitchen;
pub mod order;
pub mod recipe;

// Re-exports
pub use inventory::*;
pub use kitchen::*;
pub use order::*;
pub use recipe::*;
