//! Order management
//!
//! Orders own their line items; the kitchen reaches back into an order
//! only through the narrow [`ItemStatusSink`] seam, never by mutating the
//! order directly. Every derived money field is recomputed by
//! [`totals::recompute`] after each item mutation, so re-reading and
//! re-saving an order never shifts its numbers.

pub mod totals;

#[cfg(test)]
mod tests;

use chrono::Utc;
use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{
    Order, OrderItem, OrderItemStatus, OrderStatus, PaymentMethod, PaymentRecord, PaymentStatus,
    Station,
};
use shared::operator::Operator;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::sequence::{self, SequenceGenerator};
use crate::store::Store;

/// Payload for opening an order
#[derive(Debug, Clone, Default)]
pub struct CreateOrder {
    pub table_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub note: Option<String>,
    /// Skip Draft and open directly at Pending (counter orders)
    pub open_as_pending: bool,
    pub service_charge: Decimal,
    pub packaging_charge: Decimal,
    pub delivery_charge: Decimal,
    /// Order-level discount, on top of per-item discounts
    pub discount_amount: Decimal,
}

/// Payload for adding a line item. Price and tax rate are handed in by
/// the catalog collaborator and snapshotted onto the item.
#[derive(Debug, Clone)]
pub struct AddItemInput {
    pub product_id: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Fractional rate (0.10 = 10%)
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
    pub station: Station,
    pub special_instructions: Option<String>,
}

/// Payload for recording a payment
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub transaction_ref: Option<String>,
}

/// Write-through seam for order item status.
///
/// The kitchen dispatcher moves order items through this trait inside its
/// own write transaction, so a ticket transition and the order update it
/// implies commit or abort together.
pub trait ItemStatusSink: Send + Sync {
    fn apply_item_status(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        item_id: &str,
        status: OrderItemStatus,
    ) -> CoreResult<()>;
}

/// Order manager over the shared store
#[derive(Clone)]
pub struct OrderManager {
    store: Store,
    seq: SequenceGenerator,
    config: CoreConfig,
}

impl OrderManager {
    pub fn new(store: Store, config: CoreConfig) -> Self {
        let seq = SequenceGenerator::new(store.clone(), &config);
        Self { store, seq, config }
    }

    /// Open a new order under a freshly allocated day-scoped order id.
    ///
    /// An id collision (possible only if counters were externally reset)
    /// is retried exactly once before surfacing as `DuplicateIdentifier`.
    pub fn create_order(&self, input: CreateOrder, operator: &Operator) -> CoreResult<Order> {
        if input.service_charge.is_sign_negative()
            || input.packaging_charge.is_sign_negative()
            || input.delivery_charge.is_sign_negative()
            || input.discount_amount.is_sign_negative()
        {
            return Err(CoreError::validation("charges and discounts cannot be negative"));
        }

        let order = self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                let now = Utc::now();
                let period = sequence::day_key(now);
                let mut order_id = self.seq.next_in(txn, sequence::SCOPE_ORDER, &period)?;
                if self.store.order_exists_in(txn, &order_id)? {
                    tracing::warn!(order_id = %order_id, "Order id collision, re-allocating");
                    order_id = self.seq.next_in(txn, sequence::SCOPE_ORDER, &period)?;
                    if self.store.order_exists_in(txn, &order_id)? {
                        return Err(CoreError::DuplicateIdentifier(order_id));
                    }
                }

                let mut order = Order {
                    order_id,
                    table_ref: input.table_ref.clone(),
                    customer_ref: input.customer_ref.clone(),
                    status: if input.open_as_pending {
                        OrderStatus::Pending
                    } else {
                        OrderStatus::Draft
                    },
                    payment_status: PaymentStatus::Pending,
                    items: Vec::new(),
                    payments: Vec::new(),
                    subtotal: Decimal::ZERO,
                    tax_amount: Decimal::ZERO,
                    service_charge: input.service_charge,
                    packaging_charge: input.packaging_charge,
                    delivery_charge: input.delivery_charge,
                    discount_amount: input.discount_amount,
                    rounding_adjustment: Decimal::ZERO,
                    grand_total: Decimal::ZERO,
                    note: input.note.clone(),
                    cancel_reason: None,
                    created_by: operator.operator_id.clone(),
                    created_at: now,
                    updated_at: now,
                };
                totals::recompute(&mut order, &self.config);
                self.store.put_order(txn, &order)?;
                Ok(order)
            },
        )?;

        tracing::info!(order_id = %order.order_id, status = ?order.status, "Order created");
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> CoreResult<Order> {
        self.store
            .get_order(order_id)?
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }

    pub fn active_orders(&self) -> CoreResult<Vec<Order>> {
        Ok(self.store.list_active_orders()?)
    }

    /// Add a line item. Legal only while the order is open for changes
    /// (Draft, Pending or Confirmed).
    pub fn add_item(&self, order_id: &str, input: AddItemInput) -> CoreResult<Order> {
        if input.quantity <= Decimal::ZERO {
            return Err(CoreError::validation("item quantity must be positive"));
        }
        if input.unit_price.is_sign_negative() {
            return Err(CoreError::validation("unit price cannot be negative"));
        }
        if input.tax_rate.is_sign_negative() || input.tax_rate >= Decimal::ONE {
            return Err(CoreError::validation("tax rate must be within [0, 1)"));
        }
        if input.discount_amount.is_sign_negative() {
            return Err(CoreError::validation("discount cannot be negative"));
        }

        self.update_order(order_id, |order| {
            if !order.status.is_open_for_changes() {
                return Err(CoreError::invalid_transition(
                    "order",
                    order.status,
                    order.status,
                ));
            }
            let now = Utc::now();
            order.items.push(OrderItem {
                item_id: Uuid::new_v4().to_string(),
                product_id: input.product_id.clone(),
                name: input.name.clone(),
                quantity: input.quantity,
                unit_price: input.unit_price,
                tax_rate: input.tax_rate,
                tax_amount: Decimal::ZERO,
                discount_amount: input.discount_amount,
                total_price: Decimal::ZERO,
                status: OrderItemStatus::Pending,
                station: input.station,
                special_instructions: input.special_instructions.clone(),
                created_at: now,
                updated_at: now,
            });
            Ok(())
        })
    }

    /// Cancel a single line item. Removal is never physical: the item
    /// stays on the order with status Cancelled and drops out of totals.
    pub fn cancel_item(
        &self,
        order_id: &str,
        item_id: &str,
        reason: Option<&str>,
        operator: &Operator,
    ) -> CoreResult<Order> {
        let order = self.update_order(order_id, |order| {
            let item = order
                .item_mut(item_id)
                .ok_or_else(|| CoreError::not_found("order item", item_id))?;
            if !item.status.can_transition_to(OrderItemStatus::Cancelled) {
                return Err(CoreError::invalid_transition(
                    "order item",
                    item.status,
                    OrderItemStatus::Cancelled,
                ));
            }
            item.status = OrderItemStatus::Cancelled;
            item.updated_at = Utc::now();
            Ok(())
        })?;

        tracing::info!(
            order_id,
            item_id,
            reason = reason.unwrap_or("-"),
            operator = %operator.operator_id,
            "Order item cancelled"
        );
        Ok(order)
    }

    /// Cancel the whole order. Legal from Draft/Pending/Confirmed only;
    /// once anything is being prepared the order can no longer be voided.
    pub fn cancel_order(
        &self,
        order_id: &str,
        reason: Option<&str>,
        operator: &Operator,
    ) -> CoreResult<Order> {
        let order = self.update_order(order_id, |order| {
            if !order.status.can_transition_to(OrderStatus::Cancelled) {
                return Err(CoreError::invalid_transition(
                    "order",
                    order.status,
                    OrderStatus::Cancelled,
                ));
            }
            let now = Utc::now();
            for item in order.items.iter_mut() {
                if !item.status.is_terminal() {
                    item.status = OrderItemStatus::Cancelled;
                    item.updated_at = now;
                }
            }
            order.status = OrderStatus::Cancelled;
            order.cancel_reason = reason.map(str::to_string);
            Ok(())
        })?;

        tracing::info!(
            order_id,
            reason = reason.unwrap_or("-"),
            operator = %operator.operator_id,
            "Order cancelled"
        );
        Ok(order)
    }

    /// Move the order from Draft/Pending to Confirmed, releasing it to
    /// the kitchen. An order without active items cannot be confirmed.
    pub fn confirm_order(&self, order_id: &str) -> CoreResult<Order> {
        self.update_order(order_id, |order| {
            if !order.status.can_transition_to(OrderStatus::Confirmed) {
                return Err(CoreError::invalid_transition(
                    "order",
                    order.status,
                    OrderStatus::Confirmed,
                ));
            }
            if order.active_items().next().is_none() {
                return Err(CoreError::validation("cannot confirm an order with no items"));
            }
            order.status = OrderStatus::Confirmed;
            Ok(())
        })
    }

    /// Record a payment and derive the payment status from the paid sum
    pub fn record_payment(
        &self,
        order_id: &str,
        input: PaymentInput,
        operator: &Operator,
    ) -> CoreResult<Order> {
        if input.amount <= Decimal::ZERO {
            return Err(CoreError::validation("payment amount must be positive"));
        }

        self.update_order(order_id, |order| {
            if order.status == OrderStatus::Cancelled {
                return Err(CoreError::validation("cannot pay a cancelled order"));
            }
            order.payments.push(PaymentRecord {
                id: Uuid::new_v4().to_string(),
                method: input.method,
                amount: input.amount,
                transaction_ref: input.transaction_ref.clone(),
                operator_id: operator.operator_id.clone(),
                paid_at: Utc::now(),
            });
            Ok(())
        })
    }

    /// Close out a fully paid, fully served order
    pub fn complete_order(&self, order_id: &str) -> CoreResult<Order> {
        self.update_order(order_id, |order| {
            if order.status != OrderStatus::Served {
                return Err(CoreError::invalid_transition(
                    "order",
                    order.status,
                    OrderStatus::Completed,
                ));
            }
            if order.payment_status != PaymentStatus::Paid {
                return Err(CoreError::validation("order is not fully paid"));
            }
            order.status = OrderStatus::Completed;
            Ok(())
        })
    }

    /// Load, mutate, recompute totals, store. The shared shape of every
    /// order mutation; `mutate` returning an error aborts with zero effect.
    fn update_order(
        &self,
        order_id: &str,
        mutate: impl Fn(&mut Order) -> CoreResult<()>,
    ) -> CoreResult<Order> {
        self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                let mut order = self
                    .store
                    .get_order_in(txn, order_id)?
                    .ok_or_else(|| CoreError::not_found("order", order_id))?;
                mutate(&mut order)?;
                totals::recompute(&mut order, &self.config);
                Self::derive_payment_status(&mut order);
                order.updated_at = Utc::now();
                self.store.put_order(txn, &order)?;
                Ok(order)
            },
        )
    }

    /// Re-derive the payment status from the paid sum against the current
    /// grand total, so an item added or cancelled after payment reopens or
    /// settles the balance. Refunded/Failed are set by outer layers and
    /// never overwritten.
    fn derive_payment_status(order: &mut Order) {
        if order.payments.is_empty()
            || !matches!(
                order.payment_status,
                PaymentStatus::Pending | PaymentStatus::Paid | PaymentStatus::PartiallyPaid
            )
        {
            return;
        }
        order.payment_status = if order.paid_amount() >= order.grand_total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::PartiallyPaid
        };
    }

    /// Roll the order status forward to the minimum progress of its
    /// non-cancelled items. Only applies once the order is Confirmed; an
    /// order still being composed is never dragged forward by the kitchen.
    fn roll_order_status(order: &mut Order) {
        if !matches!(
            order.status,
            OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
        ) {
            return;
        }

        fn progress(status: OrderItemStatus) -> u8 {
            match status {
                OrderItemStatus::Pending => 0,
                OrderItemStatus::Preparing => 1,
                OrderItemStatus::Ready => 2,
                OrderItemStatus::Served | OrderItemStatus::Cancelled => 3,
            }
        }

        let slowest = order
            .active_items()
            .map(|i| i.status)
            .min_by_key(|s| progress(*s));
        if let Some(target) = slowest.and_then(|s| s.order_progress())
            && order.status.can_transition_to(target)
        {
            order.status = target;
        }
    }
}

impl ItemStatusSink for OrderManager {
    /// Validate and apply a kitchen-driven item transition inside the
    /// caller's transaction, recomputing totals and rolling the order
    /// status forward.
    fn apply_item_status(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        item_id: &str,
        status: OrderItemStatus,
    ) -> CoreResult<()> {
        let mut order = self
            .store
            .get_order_in(txn, order_id)?
            .ok_or_else(|| CoreError::not_found("order", order_id))?;

        let item = order
            .item_mut(item_id)
            .ok_or_else(|| CoreError::not_found("order item", item_id))?;
        if !item.status.can_transition_to(status) {
            return Err(CoreError::invalid_transition("order item", item.status, status));
        }
        item.status = status;
        item.updated_at = Utc::now();

        totals::recompute(&mut order, &self.config);
        Self::derive_payment_status(&mut order);
        Self::roll_order_status(&mut order);
        order.updated_at = Utc::now();
        self.store.put_order(txn, &order)?;

        tracing::debug!(order_id, item_id, status = ?status, order_status = ?order.status, "Order item status applied");
        Ok(())
    }
}
