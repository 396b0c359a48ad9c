use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shared::models::Station;
use shared::operator::Operator;

use super::*;
use crate::store::Store;

mod test_lifecycle;

fn create_test_manager() -> OrderManager {
    let store = Store::open_in_memory().unwrap();
    OrderManager::new(store, CoreConfig::default())
}

fn test_operator() -> Operator {
    Operator::new("user-1", "Test User")
}

fn item_input(name: &str, quantity: Decimal, unit_price: Decimal, tax_rate: Decimal) -> AddItemInput {
    AddItemInput {
        product_id: format!("product-{name}"),
        name: name.to_string(),
        quantity,
        unit_price,
        tax_rate,
        discount_amount: Decimal::ZERO,
        station: Station::Kitchen,
        special_instructions: None,
    }
}

/// Draft order with one 2 × 9.00 @ 10% line
fn draft_order_with_item(manager: &OrderManager) -> Order {
    let order = manager
        .create_order(CreateOrder::default(), &test_operator())
        .unwrap();
    manager
        .add_item(&order.order_id, item_input("Burger", dec!(2), dec!(9.00), dec!(0.10)))
        .unwrap()
}
