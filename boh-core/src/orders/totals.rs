//! Order money arithmetic
//!
//! All derived money fields flow from one function so a recompute is
//! idempotent: running it twice on an unchanged order is a no-op.

use rust_decimal::{Decimal, RoundingStrategy};
use shared::models::Order;

use crate::config::CoreConfig;

/// Round half-up to the configured number of decimal places
pub fn round_money(amount: Decimal, config: &CoreConfig) -> Decimal {
    amount.round_dp_with_strategy(config.currency_decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an amount to the configured cash step (0.05 for nickel rounding)
fn round_to_step(amount: Decimal, config: &CoreConfig) -> Decimal {
    let steps = (amount / config.cash_rounding_step)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    round_money(steps * config.cash_rounding_step, config)
}

/// Recompute every derived money field on the order in place.
///
/// Cancelled items contribute nothing. Line totals and the raw total are
/// clamped to zero: an extreme discount never produces a negative amount.
/// The rounding adjustment is the difference the cash step introduces,
/// kept explicit so the books still add up:
///
/// ```text
/// raw         = subtotal + tax + service + packaging + delivery − discount
/// grand_total = raw rounded to the cash step
/// adjustment  = grand_total − raw
/// ```
pub fn recompute(order: &mut Order, config: &CoreConfig) {
    let mut subtotal = Decimal::ZERO;
    let mut tax_total = Decimal::ZERO;

    for item in order.items.iter_mut() {
        let line = (item.quantity * item.unit_price - item.discount_amount).max(Decimal::ZERO);
        item.total_price = round_money(line, config);
        item.tax_amount = round_money(item.quantity * item.unit_price * item.tax_rate, config);
        if !item.is_cancelled() {
            subtotal += item.total_price;
            tax_total += item.tax_amount;
        }
    }

    order.subtotal = round_money(subtotal, config);
    order.tax_amount = round_money(tax_total, config);

    let raw = (order.subtotal + order.tax_amount + order.service_charge
        + order.packaging_charge
        + order.delivery_charge
        - order.discount_amount)
        .max(Decimal::ZERO);
    order.grand_total = round_to_step(raw, config);
    order.rounding_adjustment = order.grand_total - raw;
}
