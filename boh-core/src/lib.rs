//! Back-of-house core engine
//!
//! Embedded, transactional engine behind the restaurant management API:
//!
//! - [`inventory::StockLedger`] — append-only stock transaction log with
//!   incrementally maintained quantity-on-hand and weighted-average cost
//! - [`recipes::RecipeResolver`] — bill-of-materials explosion from a
//!   sellable product to ingredient demand
//! - [`orders::OrderManager`] — order lifecycle, line items and derived
//!   money totals
//! - [`kitchen::KitchenDispatcher`] — kitchen tickets, item status flow
//!   and the atomic stock debit on fulfillment
//! - [`sequence::SequenceGenerator`] — human-readable per-period ids
//!
//! Every mutation runs inside a single redb write transaction; operations
//! that span components (a ticket transition plus its ledger posts) share
//! one transaction and commit or abort together. HTTP, authentication and
//! notification delivery live in outer layers and hand the engine operator
//! identity and catalog prices as plain values.

pub mod config;
pub mod error;
pub mod inventory;
pub mod kitchen;
pub mod logging;
pub mod orders;
pub mod recipes;
pub mod sequence;
pub mod store;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use inventory::{StockLedger, StockPost};
pub use kitchen::KitchenDispatcher;
pub use orders::{AddItemInput, CreateOrder, ItemStatusSink, OrderManager, PaymentInput};
pub use recipes::RecipeResolver;
pub use sequence::SequenceGenerator;
pub use store::Store;
