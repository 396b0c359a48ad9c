use super::*;
use crate::error::CoreError;

#[test]
fn create_allocates_day_scoped_order_ids() {
    let manager = create_test_manager();
    let op = test_operator();

    let a = manager.create_order(CreateOrder::default(), &op).unwrap();
    let b = manager.create_order(CreateOrder::default(), &op).unwrap();

    assert!(a.order_id.starts_with("ORD-"));
    assert!(a.order_id.ends_with("-0001"));
    assert!(b.order_id.ends_with("-0002"));
    assert_eq!(a.status, OrderStatus::Draft);
    assert_eq!(a.payment_status, PaymentStatus::Pending);
}

#[test]
fn create_can_open_directly_at_pending() {
    let manager = create_test_manager();
    let order = manager
        .create_order(
            CreateOrder {
                open_as_pending: true,
                ..CreateOrder::default()
            },
            &test_operator(),
        )
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[test]
fn confirm_requires_at_least_one_active_item() {
    let manager = create_test_manager();
    let order = manager
        .create_order(CreateOrder::default(), &test_operator())
        .unwrap();

    let err = manager.confirm_order(&order.order_id).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let order = manager
        .add_item(&order.order_id, item_input("Burger", dec!(1), dec!(9.00), dec!(0.10)))
        .unwrap();
    let order = manager.confirm_order(&order.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
}

#[test]
fn items_cannot_be_added_once_preparation_starts() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);
    manager.confirm_order(&order.order_id).unwrap();

    // Kitchen picks the item up
    let item_id = order.items[0].item_id.clone();
    let txn = manager.store.begin_write().unwrap();
    manager
        .apply_item_status(&txn, &order.order_id, &item_id, OrderItemStatus::Preparing)
        .unwrap();
    txn.commit().unwrap();

    let err = manager
        .add_item(&order.order_id, item_input("Fries", dec!(1), dec!(3.00), dec!(0.10)))
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[test]
fn cancel_is_rejected_once_serving_started() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);
    let item_id = order.items[0].item_id.clone();
    manager.confirm_order(&order.order_id).unwrap();

    let txn = manager.store.begin_write().unwrap();
    manager
        .apply_item_status(&txn, &order.order_id, &item_id, OrderItemStatus::Served)
        .unwrap();
    txn.commit().unwrap();

    assert_eq!(
        manager.get_order(&order.order_id).unwrap().status,
        OrderStatus::Served
    );
    let err = manager
        .cancel_order(&order.order_id, Some("changed mind"), &test_operator())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[test]
fn pending_item_accepts_cancellation() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);
    let item_id = order.items[0].item_id.clone();

    let order = manager
        .cancel_item(&order.order_id, &item_id, Some("out of stock"), &test_operator())
        .unwrap();
    assert_eq!(order.items[0].status, OrderItemStatus::Cancelled);
    assert_eq!(order.subtotal, Decimal::ZERO);
    assert_eq!(order.grand_total, Decimal::ZERO);
}

#[test]
fn cancelling_an_order_cancels_its_open_items() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);

    let order = manager
        .cancel_order(&order.order_id, Some("walk-out"), &test_operator())
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.cancel_reason.as_deref(), Some("walk-out"));
    assert!(order.items.iter().all(|i| i.is_cancelled()));
    // cancelled order drops off the active index
    assert!(manager.active_orders().unwrap().is_empty());
}

#[test]
fn order_status_follows_slowest_active_item() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);
    let order = manager
        .add_item(&order.order_id, item_input("Fries", dec!(1), dec!(3.00), dec!(0.10)))
        .unwrap();
    manager.confirm_order(&order.order_id).unwrap();
    let burger = order.items[0].item_id.clone();
    let fries = order.items[1].item_id.clone();

    let txn = manager.store.begin_write().unwrap();
    manager
        .apply_item_status(&txn, &order.order_id, &burger, OrderItemStatus::Ready)
        .unwrap();
    txn.commit().unwrap();
    // fries still Pending: order stays Confirmed
    assert_eq!(
        manager.get_order(&order.order_id).unwrap().status,
        OrderStatus::Confirmed
    );

    let txn = manager.store.begin_write().unwrap();
    manager
        .apply_item_status(&txn, &order.order_id, &fries, OrderItemStatus::Ready)
        .unwrap();
    txn.commit().unwrap();
    assert_eq!(
        manager.get_order(&order.order_id).unwrap().status,
        OrderStatus::Ready
    );
}

#[test]
fn item_status_sink_rejects_backward_moves() {
    let manager = create_test_manager();
    let order = draft_order_with_item(&manager);
    let item_id = order.items[0].item_id.clone();
    manager.confirm_order(&order.order_id).unwrap();

    let txn = manager.store.begin_write().unwrap();
    manager
        .apply_item_status(&txn, &order.order_id, &item_id, OrderItemStatus::Ready)
        .unwrap();
    let err = manager
        .apply_item_status(&txn, &order.order_id, &item_id, OrderItemStatus::Preparing)
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));
}
