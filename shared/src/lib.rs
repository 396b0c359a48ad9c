//! Shared types for the back-of-house core
//!
//! Entity models, status state machines, units and operator metadata
//! used across the engine and its API consumers.

pub mod models;
pub mod operator;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use models::{
    IngredientDemand, InventoryItem, KitchenTicket, KitchenTicketItem, NewInventoryItem, Order,
    OrderItem,
    OrderItemStatus, OrderStatus, PaymentMethod, PaymentRecord, PaymentStatus, Recipe,
    RecipeIngredient, Station, StockTransaction, TicketStatus, TransactionDirection,
    TransactionKind, Unit, UnitFamily,
};
pub use operator::Operator;
