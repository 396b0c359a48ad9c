//! Kitchen ticket dispatch
//!
//! Tickets (KOTs) are the kitchen-side projection of confirmed order
//! items, split by station. Every status move runs in a single write
//! transaction covering the ticket, the order write-through and any stock
//! posts, so the kitchen board, the order and the ledger can never
//! disagree.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use shared::models::{
    KitchenTicket, KitchenTicketItem, Order, OrderItemStatus, OrderStatus, Station, TicketStatus,
    TransactionKind,
};
use shared::operator::Operator;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::inventory::{StockLedger, StockPost};
use crate::orders::ItemStatusSink;
use crate::recipes::RecipeResolver;
use crate::sequence::{self, SequenceGenerator};
use crate::store::Store;

/// Kitchen ticket dispatcher
///
/// Owns no order state: order items are only ever touched through the
/// [`ItemStatusSink`] seam.
#[derive(Clone)]
pub struct KitchenDispatcher {
    store: Store,
    seq: SequenceGenerator,
    ledger: StockLedger,
    recipes: RecipeResolver,
    orders: Arc<dyn ItemStatusSink>,
    config: CoreConfig,
}

impl KitchenDispatcher {
    pub fn new(
        store: Store,
        ledger: StockLedger,
        recipes: RecipeResolver,
        orders: Arc<dyn ItemStatusSink>,
        config: CoreConfig,
    ) -> Self {
        let seq = SequenceGenerator::new(store.clone(), &config);
        Self {
            store,
            seq,
            ledger,
            recipes,
            orders,
            config,
        }
    }

    /// Dispatch the order's not-yet-ticketed Pending items to their
    /// stations. Items land on the station's open Pending ticket when one
    /// exists; otherwise a new ticket number is allocated. Returns every
    /// ticket that was created or extended.
    pub fn create_ticket(&self, order_id: &str) -> CoreResult<Vec<KitchenTicket>> {
        let tickets = self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                let order = self
                    .store
                    .get_order_in(txn, order_id)?
                    .ok_or_else(|| CoreError::not_found("order", order_id))?;
                if !matches!(
                    order.status,
                    OrderStatus::Confirmed | OrderStatus::Preparing | OrderStatus::Ready
                ) {
                    return Err(CoreError::invalid_transition(
                        "order",
                        order.status,
                        OrderStatus::Preparing,
                    ));
                }

                let existing = self.store.tickets_for_order_in(txn, order_id)?;
                let by_station = Self::dispatchable_items(&order, &existing);
                if by_station.is_empty() {
                    return Err(CoreError::validation(format!(
                        "order {order_id} has no items awaiting dispatch"
                    )));
                }

                let now = Utc::now();
                let mut touched = Vec::new();
                // fixed station order keeps ticket allocation deterministic
                for station in [Station::Kitchen, Station::Bar] {
                    let Some(items) = by_station.get(&station) else {
                        continue;
                    };
                    let mut ticket = match existing
                        .iter()
                        .find(|t| t.station == station && t.status == TicketStatus::Pending)
                    {
                        Some(open) => open.clone(),
                        None => KitchenTicket {
                            ticket_no: self.seq.next_in(
                                txn,
                                sequence::SCOPE_KOT,
                                &sequence::day_key(now),
                            )?,
                            order_id: order_id.to_string(),
                            station,
                            status: TicketStatus::Pending,
                            items: Vec::new(),
                            created_at: now,
                            updated_at: now,
                        },
                    };
                    for item in items {
                        ticket.items.push(KitchenTicketItem {
                            ticket_item_id: Uuid::new_v4().to_string(),
                            order_item_id: item.item_id.clone(),
                            product_id: item.product_id.clone(),
                            name: item.name.clone(),
                            quantity: item.quantity,
                            status: TicketStatus::Pending,
                            stock_posted: false,
                            note: item.special_instructions.clone(),
                            updated_at: now,
                        });
                    }
                    ticket.updated_at = now;
                    self.store.put_ticket(txn, &ticket)?;
                    touched.push(ticket);
                }
                Ok(touched)
            },
        )?;

        for ticket in &tickets {
            tracing::info!(
                ticket_no = %ticket.ticket_no,
                order_id,
                station = %ticket.station,
                items = ticket.items.len(),
                "Ticket dispatched"
            );
        }
        Ok(tickets)
    }

    /// Pending order items not yet present on any ticket, keyed by station
    fn dispatchable_items<'a>(
        order: &'a Order,
        existing: &[KitchenTicket],
    ) -> HashMap<Station, Vec<&'a shared::models::OrderItem>> {
        let ticketed: Vec<&str> = existing
            .iter()
            .flat_map(|t| t.items.iter())
            .map(|i| i.order_item_id.as_str())
            .collect();
        let mut by_station: HashMap<Station, Vec<_>> = HashMap::new();
        for item in order.items.iter() {
            if item.status == OrderItemStatus::Pending && !ticketed.contains(&item.item_id.as_str())
            {
                by_station.entry(item.station).or_default().push(item);
            }
        }
        by_station
    }

    /// Move a ticket item to a new status.
    ///
    /// One write transaction covers the transition gate, the order item
    /// write-through, the ticket aggregate refresh, and — on the first
    /// entry into Preparing or Served — the recipe's ingredient usage
    /// posts. Insufficient stock aborts all of it; the `stock_posted`
    /// flag makes consumption exactly-once per ticket item.
    pub fn mark_item_status(
        &self,
        ticket_no: &str,
        ticket_item_id: &str,
        new_status: TicketStatus,
        operator: &Operator,
    ) -> CoreResult<KitchenTicket> {
        let ticket = self.store.with_write(
            self.config.max_commit_retries,
            self.config.commit_retry_backoff_ms,
            |txn| {
                let mut ticket = self
                    .store
                    .get_ticket_in(txn, ticket_no)?
                    .ok_or_else(|| CoreError::not_found("ticket", ticket_no))?;

                let item = ticket
                    .item(ticket_item_id)
                    .ok_or_else(|| CoreError::not_found("ticket item", ticket_item_id))?;
                if !item.status.can_transition_to(new_status) {
                    return Err(CoreError::invalid_transition(
                        "ticket item",
                        item.status,
                        new_status,
                    ));
                }

                self.orders.apply_item_status(
                    txn,
                    &ticket.order_id,
                    &item.order_item_id,
                    new_status.as_item_status(),
                )?;

                let consumes = matches!(new_status, TicketStatus::Preparing | TicketStatus::Served)
                    && !item.stock_posted;
                if consumes {
                    self.post_ingredient_usage(txn, ticket_no, item, operator)?;
                }

                // immutable borrow ends here; re-borrow mutably to write
                let item = ticket
                    .item_mut(ticket_item_id)
                    .ok_or_else(|| CoreError::not_found("ticket item", ticket_item_id))?;
                item.status = new_status;
                item.stock_posted = item.stock_posted || consumes;
                item.updated_at = Utc::now();

                ticket.refresh_status();
                ticket.updated_at = Utc::now();
                self.store.put_ticket(txn, &ticket)?;
                Ok(ticket)
            },
        )?;

        tracing::info!(
            ticket_no,
            ticket_item_id,
            status = ?new_status,
            operator = %operator.operator_id,
            "Ticket item moved"
        );
        Ok(ticket)
    }

    /// Cancel a ticket item. Legal from Pending/Preparing. Stock already
    /// consumed is never auto-reversed; staff post an explicit Wastage
    /// for started prep that gets binned.
    pub fn cancel_ticket_item(
        &self,
        ticket_no: &str,
        ticket_item_id: &str,
        operator: &Operator,
    ) -> CoreResult<KitchenTicket> {
        self.mark_item_status(ticket_no, ticket_item_id, TicketStatus::Cancelled, operator)
    }

    pub fn get_ticket(&self, ticket_no: &str) -> CoreResult<KitchenTicket> {
        self.store
            .get_ticket(ticket_no)?
            .ok_or_else(|| CoreError::not_found("ticket", ticket_no))
    }

    pub fn tickets_for_order(&self, order_id: &str) -> CoreResult<Vec<KitchenTicket>> {
        Ok(self.store.tickets_for_order(order_id)?)
    }

    /// Tickets still on the board, optionally narrowed to one station
    pub fn open_tickets(&self, station: Option<Station>) -> CoreResult<Vec<KitchenTicket>> {
        let mut tickets = self.store.list_open_tickets()?;
        if let Some(station) = station {
            tickets.retain(|t| t.station == station);
        }
        Ok(tickets)
    }

    /// One Usage post per recipe ingredient, referencing the ticket.
    ///
    /// A shortage on an optional ingredient skips that line (the dish goes
    /// out without its garnish); a shortage on a required ingredient is
    /// surfaced and aborts the caller's transaction.
    fn post_ingredient_usage(
        &self,
        txn: &redb::WriteTransaction,
        ticket_no: &str,
        item: &KitchenTicketItem,
        operator: &Operator,
    ) -> CoreResult<()> {
        let demand = self
            .recipes
            .ingredient_demand_in(txn, &item.product_id, item.quantity)?;
        for line in demand {
            let optional = line.is_optional;
            let post = StockPost {
                item_id: line.inventory_item_id,
                kind: TransactionKind::Usage,
                quantity: line.quantity,
                unit: line.unit,
                unit_cost: Decimal::ZERO,
                reference: Some(ticket_no.to_string()),
            };
            match self.ledger.post_transaction_in(txn, &post, operator) {
                Ok(_) => {}
                Err(CoreError::InsufficientStock {
                    item_id,
                    requested,
                    available,
                }) if optional => {
                    tracing::warn!(
                        %item_id,
                        %requested,
                        %available,
                        ticket_no,
                        "Optional ingredient short, skipped"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shared::models::{NewInventoryItem, Recipe, RecipeIngredient, Unit};

    use crate::orders::{AddItemInput, CreateOrder, OrderManager};

    struct Fixture {
        manager: OrderManager,
        ledger: StockLedger,
        recipes: RecipeResolver,
        dispatcher: KitchenDispatcher,
    }

    fn create_fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let config = CoreConfig::default();
        let manager = OrderManager::new(store.clone(), config.clone());
        let ledger = StockLedger::new(store.clone(), config.clone());
        let recipes = RecipeResolver::new(store.clone(), config.clone());
        let dispatcher = KitchenDispatcher::new(
            store,
            ledger.clone(),
            recipes.clone(),
            Arc::new(manager.clone()),
            config,
        );
        Fixture {
            manager,
            ledger,
            recipes,
            dispatcher,
        }
    }

    fn test_operator() -> Operator {
        Operator::new("chef-1", "Test Chef")
    }

    fn item_input(name: &str, station: Station) -> AddItemInput {
        AddItemInput {
            product_id: format!("product-{name}"),
            name: name.to_string(),
            quantity: dec!(2),
            unit_price: dec!(9.00),
            tax_rate: dec!(0.10),
            discount_amount: Decimal::ZERO,
            station,
            special_instructions: None,
        }
    }

    /// Confirmed order with a Kitchen and a Bar line
    fn confirmed_order(f: &Fixture) -> Order {
        let order = f
            .manager
            .create_order(CreateOrder::default(), &test_operator())
            .unwrap();
        f.manager
            .add_item(&order.order_id, item_input("Burger", Station::Kitchen))
            .unwrap();
        f.manager
            .add_item(&order.order_id, item_input("Mojito", Station::Bar))
            .unwrap();
        f.manager.confirm_order(&order.order_id).unwrap()
    }

    fn stocked_ingredient(f: &Fixture, name: &str, qty: Decimal) -> String {
        let item = f
            .ledger
            .create_item(NewInventoryItem {
                name: name.to_string(),
                category: None,
                supplier: None,
                unit: Unit::G,
                reorder_level: Decimal::ZERO,
            })
            .unwrap();
        f.ledger
            .post_transaction(
                &StockPost {
                    item_id: item.id.clone(),
                    kind: TransactionKind::Purchase,
                    quantity: qty,
                    unit: Unit::G,
                    unit_cost: dec!(0.01),
                    reference: None,
                },
                &test_operator(),
            )
            .unwrap();
        item.id
    }

    fn burger_recipe(f: &Fixture, patty_id: &str, grams_per_serving: Decimal) {
        let now = Utc::now();
        f.recipes
            .set_recipe(Recipe {
                product_id: "product-Burger".to_string(),
                name: "Burger".to_string(),
                servings: 1,
                instructions: None,
                preparation_minutes: Some(5),
                cooking_minutes: Some(8),
                ingredients: vec![RecipeIngredient {
                    inventory_item_id: patty_id.to_string(),
                    quantity_per_serving: grams_per_serving,
                    unit: Unit::G,
                    is_optional: false,
                    step: 1,
                    note: None,
                }],
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    #[test]
    fn dispatch_splits_items_by_station() {
        let f = create_fixture();
        let order = confirmed_order(&f);

        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].station, Station::Kitchen);
        assert_eq!(tickets[1].station, Station::Bar);
        assert!(tickets[0].ticket_no.starts_with("KOT-"));
        assert_ne!(tickets[0].ticket_no, tickets[1].ticket_no);
        assert_eq!(tickets[0].items.len(), 1);
        assert_eq!(tickets[0].items[0].name, "Burger");
    }

    #[test]
    fn dispatch_requires_a_confirmed_order() {
        let f = create_fixture();
        let order = f
            .manager
            .create_order(CreateOrder::default(), &test_operator())
            .unwrap();
        f.manager
            .add_item(&order.order_id, item_input("Burger", Station::Kitchen))
            .unwrap();

        let err = f.dispatcher.create_ticket(&order.order_id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn late_items_append_to_the_open_station_ticket() {
        let f = create_fixture();
        let order = confirmed_order(&f);
        let first = f.dispatcher.create_ticket(&order.order_id).unwrap();

        f.manager
            .add_item(&order.order_id, item_input("Fries", Station::Kitchen))
            .unwrap();
        let second = f.dispatcher.create_ticket(&order.order_id).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].ticket_no, first[0].ticket_no);
        assert_eq!(second[0].items.len(), 2);
    }

    #[test]
    fn dispatch_with_nothing_new_is_an_error() {
        let f = create_fixture();
        let order = confirmed_order(&f);
        f.dispatcher.create_ticket(&order.order_id).unwrap();

        let err = f.dispatcher.create_ticket(&order.order_id).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn preparing_posts_ingredient_usage_exactly_once() {
        let f = create_fixture();
        let patty = stocked_ingredient(&f, "Patty", dec!(1000));
        burger_recipe(&f, &patty, dec!(150));
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let kot = &tickets[0];
        let ticket_item = kot.items[0].ticket_item_id.clone();

        // 2 servings × 150 g
        let ticket = f
            .dispatcher
            .mark_item_status(&kot.ticket_no, &ticket_item, TicketStatus::Preparing, &test_operator())
            .unwrap();
        assert!(ticket.items[0].stock_posted);
        let (qty, _) = f.ledger.current_stock(&patty).unwrap();
        assert_eq!(qty, dec!(700));

        // moving on to Ready/Served does not consume again
        f.dispatcher
            .mark_item_status(&kot.ticket_no, &ticket_item, TicketStatus::Ready, &test_operator())
            .unwrap();
        f.dispatcher
            .mark_item_status(&kot.ticket_no, &ticket_item, TicketStatus::Served, &test_operator())
            .unwrap();
        let (qty, _) = f.ledger.current_stock(&patty).unwrap();
        assert_eq!(qty, dec!(700));

        let usages = f.ledger.transactions(&patty).unwrap();
        assert_eq!(usages.len(), 2); // purchase + one usage
        assert_eq!(usages[1].kind, TransactionKind::Usage);
        assert_eq!(usages[1].reference.as_deref(), Some(kot.ticket_no.as_str()));
    }

    #[test]
    fn short_optional_ingredient_is_skipped_not_fatal() {
        let f = create_fixture();
        let patty = stocked_ingredient(&f, "Patty", dec!(1000));
        let garnish = stocked_ingredient(&f, "Parsley", dec!(10)); // 2 servings need 100 g
        let now = Utc::now();
        f.recipes
            .set_recipe(Recipe {
                product_id: "product-Burger".to_string(),
                name: "Burger".to_string(),
                servings: 1,
                instructions: None,
                preparation_minutes: Some(5),
                cooking_minutes: Some(8),
                ingredients: vec![
                    RecipeIngredient {
                        inventory_item_id: patty.clone(),
                        quantity_per_serving: dec!(150),
                        unit: Unit::G,
                        is_optional: false,
                        step: 1,
                        note: None,
                    },
                    RecipeIngredient {
                        inventory_item_id: garnish.clone(),
                        quantity_per_serving: dec!(50),
                        unit: Unit::G,
                        is_optional: true,
                        step: 2,
                        note: None,
                    },
                ],
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let kot = &tickets[0];

        let ticket = f
            .dispatcher
            .mark_item_status(&kot.ticket_no, &kot.items[0].ticket_item_id, TicketStatus::Preparing, &test_operator())
            .unwrap();
        assert_eq!(ticket.items[0].status, TicketStatus::Preparing);

        // required ingredient consumed, short optional one left alone
        let (qty, _) = f.ledger.current_stock(&patty).unwrap();
        assert_eq!(qty, dec!(700));
        let (qty, _) = f.ledger.current_stock(&garnish).unwrap();
        assert_eq!(qty, dec!(10));
        assert_eq!(f.ledger.transactions(&garnish).unwrap().len(), 1);
    }

    #[test]
    fn insufficient_stock_aborts_the_whole_transition() {
        let f = create_fixture();
        let patty = stocked_ingredient(&f, "Patty", dec!(100));
        burger_recipe(&f, &patty, dec!(150)); // 2 servings need 300 g
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let kot = &tickets[0];
        let ticket_item = kot.items[0].ticket_item_id.clone();

        let err = f
            .dispatcher
            .mark_item_status(&kot.ticket_no, &ticket_item, TicketStatus::Preparing, &test_operator())
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));

        // ticket item, order item and stock are all untouched
        let ticket = f.dispatcher.get_ticket(&kot.ticket_no).unwrap();
        assert_eq!(ticket.items[0].status, TicketStatus::Pending);
        assert!(!ticket.items[0].stock_posted);
        let order = f.manager.get_order(&order.order_id).unwrap();
        assert!(order
            .items
            .iter()
            .all(|i| i.status == OrderItemStatus::Pending));
        let (qty, _) = f.ledger.current_stock(&patty).unwrap();
        assert_eq!(qty, dec!(100));
    }

    #[test]
    fn ticket_moves_write_through_to_the_order() {
        let f = create_fixture();
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let op = test_operator();

        for ticket in &tickets {
            f.dispatcher
                .mark_item_status(
                    &ticket.ticket_no,
                    &ticket.items[0].ticket_item_id,
                    TicketStatus::Preparing,
                    &op,
                )
                .unwrap();
        }

        let order = f.manager.get_order(&order.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert!(order
            .items
            .iter()
            .all(|i| i.status == OrderItemStatus::Preparing));
    }

    #[test]
    fn cancelling_a_ticket_item_never_reverses_stock() {
        let f = create_fixture();
        let patty = stocked_ingredient(&f, "Patty", dec!(1000));
        burger_recipe(&f, &patty, dec!(150));
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let kot = &tickets[0];
        let ticket_item = kot.items[0].ticket_item_id.clone();
        let op = test_operator();

        f.dispatcher
            .mark_item_status(&kot.ticket_no, &ticket_item, TicketStatus::Preparing, &op)
            .unwrap();
        let ticket = f
            .dispatcher
            .cancel_ticket_item(&kot.ticket_no, &ticket_item, &op)
            .unwrap();

        assert_eq!(ticket.items[0].status, TicketStatus::Cancelled);
        assert_eq!(ticket.status, TicketStatus::Cancelled);
        let (qty, _) = f.ledger.current_stock(&patty).unwrap();
        assert_eq!(qty, dec!(700));
    }

    #[test]
    fn served_tickets_leave_the_open_board() {
        let f = create_fixture();
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let op = test_operator();
        assert_eq!(f.dispatcher.open_tickets(None).unwrap().len(), 2);

        let kot = &tickets[0];
        f.dispatcher
            .mark_item_status(&kot.ticket_no, &kot.items[0].ticket_item_id, TicketStatus::Served, &op)
            .unwrap();

        let open = f.dispatcher.open_tickets(None).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].station, Station::Bar);
        assert!(f
            .dispatcher
            .open_tickets(Some(Station::Kitchen))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn product_without_recipe_consumes_nothing() {
        let f = create_fixture();
        let order = confirmed_order(&f);
        let tickets = f.dispatcher.create_ticket(&order.order_id).unwrap();
        let kot = &tickets[0];
        let op = test_operator();

        let ticket = f
            .dispatcher
            .mark_item_status(&kot.ticket_no, &kot.items[0].ticket_item_id, TicketStatus::Preparing, &op)
            .unwrap();
        assert_eq!(ticket.items[0].status, TicketStatus::Preparing);
        assert!(ticket.items[0].stock_posted);
    }
}
