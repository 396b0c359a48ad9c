//! Order Model
//!
//! Status enums are closed transition tables: every move goes through
//! `can_transition_to`, so a backward or illegal move is unrepresentable
//! at the call sites that honor the gate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::kitchen::Station;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Draft,
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Served,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Position on the forward axis; Cancelled sits outside it
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Draft => Some(0),
            OrderStatus::Pending => Some(1),
            OrderStatus::Confirmed => Some(2),
            OrderStatus::Preparing => Some(3),
            OrderStatus::Ready => Some(4),
            OrderStatus::Served => Some(5),
            OrderStatus::Completed => Some(6),
            OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Items may only be added (and the order confirmed/cancelled) while
    /// the order has not entered preparation.
    pub fn is_open_for_changes(&self) -> bool {
        matches!(
            self,
            OrderStatus::Draft | OrderStatus::Pending | OrderStatus::Confirmed
        )
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if target == OrderStatus::Cancelled {
            return self.is_open_for_changes();
        }
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// Order item status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl OrderItemStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            OrderItemStatus::Pending => Some(0),
            OrderItemStatus::Preparing => Some(1),
            OrderItemStatus::Ready => Some(2),
            OrderItemStatus::Served => Some(3),
            OrderItemStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderItemStatus::Served | OrderItemStatus::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        *self == OrderItemStatus::Cancelled
    }

    pub fn can_transition_to(&self, target: OrderItemStatus) -> bool {
        if target == OrderItemStatus::Cancelled {
            return matches!(self, OrderItemStatus::Pending | OrderItemStatus::Preparing);
        }
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// The order status an item at this progress pins the order to
    pub fn order_progress(&self) -> Option<OrderStatus> {
        match self {
            OrderItemStatus::Pending => None,
            OrderItemStatus::Preparing => Some(OrderStatus::Preparing),
            OrderItemStatus::Ready => Some(OrderStatus::Ready),
            OrderItemStatus::Served => Some(OrderStatus::Served),
            OrderItemStatus::Cancelled => None,
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    PartiallyPaid,
    Refunded,
    Failed,
}

/// Payment method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
    Wallet,
}

/// Payment record attached to an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub transaction_ref: Option<String>,
    pub operator_id: String,
    pub paid_at: DateTime<Utc>,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    /// Unique within the owning order
    pub item_id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: Decimal,
    /// Snapshotted from the catalog at add time, immutable afterwards
    pub unit_price: Decimal,
    /// Fractional rate (0.10 = 10%), snapshotted with the price
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    /// quantity × unit_price − discount_amount
    pub total_price: Decimal,
    pub status: OrderItemStatus,
    pub station: Station,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }
}

/// Order entity
///
/// `subtotal`, `tax_amount`, `rounding_adjustment` and `grand_total` are
/// derived by `recompute_totals`; nothing else writes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Human-readable unique id (ORD-YYYYMMDD-NNNN)
    pub order_id: String,
    pub table_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub payments: Vec<PaymentRecord>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub packaging_charge: Decimal,
    pub delivery_charge: Decimal,
    pub discount_amount: Decimal,
    pub rounding_adjustment: Decimal,
    pub grand_total: Decimal,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Non-cancelled items, the set every derived total is folded over
    pub fn active_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|i| !i.is_cancelled())
    }

    pub fn item(&self, item_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    pub fn paid_amount(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }
}
