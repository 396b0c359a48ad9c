//! Recipe (bill of materials) Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::inventory::Unit;

/// Single ingredient line of a recipe
///
/// `inventory_item_id` is a non-owning reference into the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeIngredient {
    pub inventory_item_id: String,
    /// Consumed per serving sold
    pub quantity_per_serving: Decimal,
    pub unit: Unit,
    pub is_optional: bool,
    /// Preparation ordering
    pub step: u32,
    pub note: Option<String>,
}

/// Recipe entity - at most one active recipe per product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub product_id: String,
    pub name: String,
    /// Portions one batch yields, at least 1
    pub servings: u32,
    pub instructions: Option<String>,
    pub preparation_minutes: Option<u32>,
    pub cooking_minutes: Option<u32>,
    pub ingredients: Vec<RecipeIngredient>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of resolved ingredient demand for a quantity of product sold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientDemand {
    pub inventory_item_id: String,
    pub quantity: Decimal,
    pub unit: Unit,
    pub is_optional: bool,
}
