//! Inventory Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stock-keeping unit of measure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    Kg,
    G,
    L,
    Ml,
    Pcs,
    Pkt,
    Btl,
    Box,
}

/// Unit family - conversions are only legal within one family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitFamily {
    Mass,
    Volume,
    Count,
    Package,
}

impl Unit {
    pub fn family(&self) -> UnitFamily {
        match self {
            Unit::Kg | Unit::G => UnitFamily::Mass,
            Unit::L | Unit::Ml => UnitFamily::Volume,
            Unit::Pcs => UnitFamily::Count,
            Unit::Pkt | Unit::Btl | Unit::Box => UnitFamily::Package,
        }
    }

    /// Factor to the family's base unit (g, ml, piece, package)
    fn base_factor(&self) -> Decimal {
        match self {
            Unit::Kg | Unit::L => Decimal::from(1000),
            _ => Decimal::ONE,
        }
    }

    /// Convert a quantity expressed in `self` into `target`.
    ///
    /// Returns `None` when the units belong to different families, or for
    /// distinct package units (a bottle is not a box).
    pub fn convert(&self, quantity: Decimal, target: Unit) -> Option<Decimal> {
        if *self == target {
            return Some(quantity);
        }
        if self.family() != target.family() {
            return None;
        }
        if self.family() == UnitFamily::Package {
            return None;
        }
        Some(quantity * self.base_factor() / target.base_factor())
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Unit::Kg => "KG",
            Unit::G => "G",
            Unit::L => "L",
            Unit::Ml => "ML",
            Unit::Pcs => "PCS",
            Unit::Pkt => "PKT",
            Unit::Btl => "BTL",
            Unit::Box => "BOX",
        };
        f.write_str(s)
    }
}

/// Inventory item entity
///
/// `quantity_on_hand`, `average_cost` and `cost_per_unit` are owned by the
/// stock ledger and only ever change through transaction application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: String,
    /// Generated stock-keeping code (SKU-YYYYMM-NNNN)
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Unit,
    /// Never negative
    pub quantity_on_hand: Decimal,
    /// Unit cost of the last priced addition
    pub cost_per_unit: Decimal,
    /// Weighted-average unit cost; meaningful only while quantity > 0
    pub average_cost: Decimal,
    pub reorder_level: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.is_active && self.quantity_on_hand <= self.reorder_level
    }
}

/// Payload for registering a new inventory item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Unit,
    pub reorder_level: Decimal,
}

/// Stock transaction kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Usage,
    Adjustment,
    Wastage,
    Return,
    TransferIn,
    TransferOut,
}

/// Direction a transaction moves stock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionDirection {
    In,
    Out,
    /// Sign comes from the posted quantity (Adjustment only)
    Signed,
}

impl TransactionKind {
    pub fn direction(&self) -> TransactionDirection {
        match self {
            TransactionKind::Purchase | TransactionKind::Return | TransactionKind::TransferIn => {
                TransactionDirection::In
            }
            TransactionKind::Usage | TransactionKind::Wastage | TransactionKind::TransferOut => {
                TransactionDirection::Out
            }
            TransactionKind::Adjustment => TransactionDirection::Signed,
        }
    }

    /// Whether a priced post of this kind reblends the average cost
    pub fn blends_average_cost(&self) -> bool {
        matches!(self.direction(), TransactionDirection::In)
    }
}

/// Stock transaction entity - immutable once created, never deleted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockTransaction {
    pub id: String,
    pub item_id: String,
    pub kind: TransactionKind,
    /// Quantity in the item's unit; signed only for Adjustment
    pub quantity: Decimal,
    pub unit: Unit,
    pub unit_cost: Decimal,
    /// quantity × unit_cost
    pub total_cost: Decimal,
    /// Free-form link to the triggering document (ticket number, PO, ...)
    pub reference: Option<String>,
    pub operator_id: String,
    pub operator_name: String,
    pub created_at: DateTime<Utc>,
}
