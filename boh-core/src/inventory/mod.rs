//! Stock ledger
//!
//! Owns inventory items and the append-only stock transaction log.
//! `quantity_on_hand` and `average_cost` are maintained incrementally on
//! every post; they are never recomputed from the log on reads and never
//! touched by any other component. Posting a transaction is the single
//! mutation path — there is no save hook that re-applies deltas.

use chrono::Utc;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{
    InventoryItem, NewInventoryItem, StockTransaction, TransactionDirection, TransactionKind, Unit,
};
use shared::operator::Operator;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::sequence::{self, SequenceGenerator};
use crate::store::Store;

/// Payload for posting a stock transaction
#[derive(Debug, Clone)]
pub struct StockPost {
    pub item_id: String,
    pub kind: TransactionKind,
    /// Positive for every kind except Adjustment, which may be signed
    pub quantity: Decimal,
    /// Unit the quantity is expressed in; must share the item's family
    pub unit: Unit,
    /// Per-unit cost in the posted unit; zero for unpriced movements
    pub unit_cost: Decimal,
    pub reference: Option<String>,
}

/// Stock ledger over the shared store
#[derive(Clone)]
pub struct StockLedger {
    store: Store,
    seq: SequenceGenerator,
    config: CoreConfig,
}

impl StockLedger {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        let seq = SequenceGenerator::new(store.clone(), &config);
        Self { store, seq, config }
    }

    /// Register a new inventory item with a generated SKU and zero stock
    pub fn create_item(&self, new_item: NewInventoryItem) -> CoreResult<InventoryItem> {
        if new_item.name.trim().is_empty() {
            return Err(CoreError::validation("item name cannot be empty"));
        }
        if new_item.reorder_level.is_sign_negative() {
            return Err(CoreError::validation("reorder level cannot be negative"));
        }

        let item = self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                let now = Utc::now();
                let sku = self
                    .seq
                    .next_in(txn, sequence::SCOPE_SKU, &sequence::month_key(now))?;
                let item = InventoryItem {
                    id: Uuid::new_v4().to_string(),
                    sku,
                    name: new_item.name.clone(),
                    category: new_item.category.clone(),
                    supplier: new_item.supplier.clone(),
                    unit: new_item.unit,
                    quantity_on_hand: Decimal::ZERO,
                    cost_per_unit: Decimal::ZERO,
                    average_cost: Decimal::ZERO,
                    reorder_level: new_item.reorder_level,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                self.store.put_inventory_item(txn, &item)?;
                Ok(item)
            },
        )?;

        tracing::info!(item_id = %item.id, sku = %item.sku, name = %item.name, "Inventory item created");
        Ok(item)
    }

    /// Post a stock transaction in its own transaction
    pub fn post_transaction(
        &self,
        post: &StockPost,
        operator: &Operator,
    ) -> CoreResult<StockTransaction> {
        self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| self.post_transaction_in(txn, post, operator),
        )
    }

    /// Post a stock transaction as part of the caller's transaction.
    ///
    /// Atomically appends the immutable transaction record, applies the
    /// signed quantity delta, and reblends the weighted-average cost for
    /// priced additions:
    ///
    /// ```text
    /// new_avg = (old_avg × old_qty + unit_cost × qty) / (old_qty + qty)
    /// ```
    ///
    /// Deductions draw down at the current average cost and leave it
    /// unchanged. A deduction exceeding quantity-on-hand fails with
    /// `InsufficientStock` and, because the caller's transaction aborts on
    /// error, has zero effect.
    pub fn post_transaction_in(
        &self,
        txn: &WriteTransaction,
        post: &StockPost,
        operator: &Operator,
    ) -> CoreResult<StockTransaction> {
        if post.unit_cost.is_sign_negative() {
            return Err(CoreError::validation("unit cost cannot be negative"));
        }

        let mut item = self
            .store
            .get_inventory_item_in(txn, &post.item_id)?
            .ok_or_else(|| CoreError::not_found("inventory item", &post.item_id))?;

        // Quantity sign rules: only Adjustment may be signed
        let direction = post.kind.direction();
        match direction {
            TransactionDirection::Signed => {
                if post.quantity.is_zero() {
                    return Err(CoreError::validation("adjustment quantity cannot be zero"));
                }
            }
            _ => {
                if post.quantity <= Decimal::ZERO {
                    return Err(CoreError::validation(format!(
                        "quantity must be positive, got {}",
                        post.quantity
                    )));
                }
            }
        }

        // Convert into the item's unit; cross-family posts are rejected
        let quantity = post.unit.convert(post.quantity, item.unit).ok_or_else(|| {
            CoreError::validation(format!(
                "unit {} is incompatible with item unit {}",
                post.unit, item.unit
            ))
        })?;
        // unit_cost is per posted unit; rebase it onto the item's unit so
        // cost blending stays consistent (1 kg @ 2.00 == 1000 g @ 0.002)
        let unit_cost = if quantity.is_zero() {
            post.unit_cost
        } else {
            (post.unit_cost * post.quantity / quantity).round_dp(4)
        };

        let delta = match direction {
            TransactionDirection::In => quantity,
            TransactionDirection::Out => -quantity,
            TransactionDirection::Signed => quantity,
        };

        let new_quantity = item.quantity_on_hand + delta;
        if new_quantity.is_sign_negative() {
            return Err(CoreError::InsufficientStock {
                item_id: item.id.clone(),
                requested: delta.abs(),
                available: item.quantity_on_hand,
            });
        }

        // Weighted-average reblend, only for priced additions
        if post.kind.blends_average_cost() && unit_cost > Decimal::ZERO {
            let old_value = item.average_cost * item.quantity_on_hand;
            let added_value = unit_cost * quantity;
            item.average_cost = ((old_value + added_value) / new_quantity).round_dp(4);
            item.cost_per_unit = unit_cost;
        }

        item.quantity_on_hand = new_quantity;
        item.updated_at = Utc::now();

        let transaction = StockTransaction {
            id: Uuid::new_v4().to_string(),
            item_id: item.id.clone(),
            kind: post.kind,
            quantity,
            unit: item.unit,
            unit_cost,
            total_cost: (quantity.abs() * unit_cost).round_dp(4),
            reference: post.reference.clone(),
            operator_id: operator.operator_id.clone(),
            operator_name: operator.operator_name.clone(),
            created_at: item.updated_at,
        };

        self.store.append_stock_transaction(txn, &transaction)?;
        self.store.put_inventory_item(txn, &item)?;

        tracing::debug!(
            item_id = %item.id,
            kind = ?post.kind,
            quantity = %transaction.quantity,
            on_hand = %item.quantity_on_hand,
            average_cost = %item.average_cost,
            "Stock transaction posted"
        );

        Ok(transaction)
    }

    /// Read-only snapshot of (quantity_on_hand, average_cost)
    pub fn current_stock(&self, item_id: &str) -> CoreResult<(Decimal, Decimal)> {
        let item = self
            .store
            .get_inventory_item(item_id)?
            .ok_or_else(|| CoreError::not_found("inventory item", item_id))?;
        Ok((item.quantity_on_hand, item.average_cost))
    }

    pub fn get_item(&self, item_id: &str) -> CoreResult<InventoryItem> {
        self.store
            .get_inventory_item(item_id)?
            .ok_or_else(|| CoreError::not_found("inventory item", item_id))
    }

    /// Active items at or below their reorder level, in no particular order
    pub fn low_stock_items(&self) -> CoreResult<Vec<InventoryItem>> {
        let items = self.store.scan_inventory_items()?;
        Ok(items.into_iter().filter(|i| i.is_low_stock()).collect())
    }

    /// Full audit trail for an item, oldest first
    pub fn transactions(&self, item_id: &str) -> CoreResult<Vec<StockTransaction>> {
        Ok(self.store.get_stock_transactions(item_id)?)
    }
}
