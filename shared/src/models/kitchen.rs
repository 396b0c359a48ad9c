//! Kitchen Ticket (KOT) Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderItemStatus;

/// Preparation station a ticket is routed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Station {
    #[default]
    Kitchen,
    Bar,
}

impl std::fmt::Display for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Station::Kitchen => f.write_str("KITCHEN"),
            Station::Bar => f.write_str("BAR"),
        }
    }
}

/// Ticket and ticket-item status
///
/// Same shape and gates as [`OrderItemStatus`]; tickets track the kitchen
/// side while the order item tracks the front of house, and the dispatcher
/// keeps the two in lockstep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

impl TicketStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            TicketStatus::Pending => Some(0),
            TicketStatus::Preparing => Some(1),
            TicketStatus::Ready => Some(2),
            TicketStatus::Served => Some(3),
            TicketStatus::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self == TicketStatus::Cancelled
    }

    pub fn can_transition_to(&self, target: TicketStatus) -> bool {
        if target == TicketStatus::Cancelled {
            return matches!(self, TicketStatus::Pending | TicketStatus::Preparing);
        }
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// The order-item status this ticket status writes through
    pub fn as_item_status(&self) -> OrderItemStatus {
        match self {
            TicketStatus::Pending => OrderItemStatus::Pending,
            TicketStatus::Preparing => OrderItemStatus::Preparing,
            TicketStatus::Ready => OrderItemStatus::Ready,
            TicketStatus::Served => OrderItemStatus::Served,
            TicketStatus::Cancelled => OrderItemStatus::Cancelled,
        }
    }

    /// Minimum-progress aggregate over non-cancelled item statuses.
    ///
    /// A ticket is Ready only once every live item is Ready or beyond;
    /// a ticket with only cancelled items is Cancelled.
    pub fn aggregate<I: IntoIterator<Item = TicketStatus>>(statuses: I) -> TicketStatus {
        let mut min_rank: Option<u8> = None;
        let mut saw_live = false;
        for s in statuses {
            if let Some(r) = s.rank() {
                saw_live = true;
                min_rank = Some(min_rank.map_or(r, |m| m.min(r)));
            }
        }
        if !saw_live {
            return TicketStatus::Cancelled;
        }
        match min_rank {
            Some(0) => TicketStatus::Pending,
            Some(1) => TicketStatus::Preparing,
            Some(2) => TicketStatus::Ready,
            _ => TicketStatus::Served,
        }
    }
}

/// Ticket line item
///
/// Holds a non-owning back-reference to the order item; lifecycle control
/// stays with the order aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KitchenTicketItem {
    /// Unique within the owning ticket
    pub ticket_item_id: String,
    pub order_item_id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: Decimal,
    pub status: TicketStatus,
    /// Set once ingredient usage has been posted to the stock ledger
    pub stock_posted: bool,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Kitchen ticket entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KitchenTicket {
    /// Generated ticket number (KOT-YYYYMMDD-NNNN)
    pub ticket_no: String,
    pub order_id: String,
    pub station: Station,
    /// Minimum-progress aggregate of the item statuses
    pub status: TicketStatus,
    pub items: Vec<KitchenTicketItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KitchenTicket {
    pub fn item(&self, ticket_item_id: &str) -> Option<&KitchenTicketItem> {
        self.items.iter().find(|i| i.ticket_item_id == ticket_item_id)
    }

    pub fn item_mut(&mut self, ticket_item_id: &str) -> Option<&mut KitchenTicketItem> {
        self.items
            .iter_mut()
            .find(|i| i.ticket_item_id == ticket_item_id)
    }

    pub fn refresh_status(&mut self) {
        self.status = TicketStatus::aggregate(self.items.iter().map(|i| i.status));
    }
}
