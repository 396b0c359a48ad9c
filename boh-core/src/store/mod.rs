//! redb-based storage layer for the back-of-house engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `inventory_items` | `item_id` | `InventoryItem` | Ledger-owned item state |
//! | `stock_transactions` | `(item_id, seq)` | `StockTransaction` | Append-only movement log |
//! | `recipes` | `product_id` | `Recipe` | At most one active recipe per product |
//! | `orders` | `order_id` | `Order` | Orders with embedded line items |
//! | `active_orders` | `order_id` | `()` | Non-terminal order index |
//! | `kitchen_tickets` | `ticket_no` | `KitchenTicket` | Tickets with embedded items |
//! | `order_tickets` | `(order_id, ticket_no)` | `()` | Order → ticket index |
//! | `open_tickets` | `ticket_no` | `()` | Not-yet-finished ticket index |
//! | `sequences` | `(scope, period)` | `u64` | Identifier counters |
//!
//! # Atomicity
//!
//! redb is single-writer: every mutating engine operation runs inside one
//! `WriteTransaction` handed down through the `*_in` methods, so a ticket
//! transition and the ledger posts it triggers commit or abort as a unit.
//! Histories (stock transactions, cancelled orders/tickets) are never
//! physically deleted.

use redb::{
    Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use shared::models::{InventoryItem, KitchenTicket, Order, Recipe, StockTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{CoreError, CoreResult};

/// Table for inventory items: key = item_id, value = JSON-serialized InventoryItem
const INVENTORY_ITEMS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("inventory_items");

/// Table for the stock movement log: key = (item_id, seq), value = JSON-serialized StockTransaction
const STOCK_TRANSACTIONS_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("stock_transactions");

/// Table for recipes: key = product_id, value = JSON-serialized Recipe
const RECIPES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("recipes");

/// Table for orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Table for tracking non-terminal orders: key = order_id, value = empty (existence check)
const ACTIVE_ORDERS_TABLE: TableDefinition<&str, ()> = TableDefinition::new("active_orders");

/// Table for kitchen tickets: key = ticket_no, value = JSON-serialized KitchenTicket
const KITCHEN_TICKETS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("kitchen_tickets");

/// Table indexing tickets by order: key = (order_id, ticket_no), value = empty
const ORDER_TICKETS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("order_tickets");

/// Table for tickets still on a station's board: key = ticket_no, value = empty
const OPEN_TICKETS_TABLE: TableDefinition<&str, ()> = TableDefinition::new("open_tickets");

/// Table for identifier counters: key = (scope, period), value = last issued number
const SEQUENCES_TABLE: TableDefinition<(&str, &str), u64> = TableDefinition::new("sequences");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Engine storage backed by redb
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at the given path.
    ///
    /// redb commits with immediate durability (copy-on-write with atomic
    /// pointer swap), so the file is always in a consistent state even
    /// across power loss.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Create all tables so later read transactions never miss one
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(INVENTORY_ITEMS_TABLE)?;
            let _ = write_txn.open_table(STOCK_TRANSACTIONS_TABLE)?;
            let _ = write_txn.open_table(RECIPES_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ACTIVE_ORDERS_TABLE)?;
            let _ = write_txn.open_table(KITCHEN_TICKETS_TABLE)?;
            let _ = write_txn.open_table(ORDER_TICKETS_TABLE)?;
            let _ = write_txn.open_table(OPEN_TICKETS_TABLE)?;
            let _ = write_txn.open_table(SEQUENCES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Run `f` inside a write transaction and commit, retrying commit
    /// contention up to `max_retries` times with a fixed backoff.
    ///
    /// `f` must be re-runnable: it only ever sees uncommitted state of its
    /// own attempt, and an error return aborts the transaction with zero
    /// effect.
    pub fn with_write<T>(
        &self,
        max_retries: u32,
        backoff_ms: u64,
        f: impl Fn(&WriteTransaction) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut attempt = 0;
        loop {
            let txn = self.begin_write().map_err(CoreError::Storage)?;
            let value = f(&txn)?; // dropping txn on error aborts it
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Commit contention, retrying");
                    std::thread::sleep(std::time::Duration::from_millis(backoff_ms));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Commit failed after retries");
                    return Err(CoreError::TransientConcurrency(e.to_string()));
                }
            }
        }
    }

    // ========== Sequence Counters ==========

    /// Increment and return the counter for `(scope, period)`.
    ///
    /// Allocation happens inside the caller's write transaction, so two
    /// concurrent callers serialize on the storage engine and can never
    /// observe the same value. Aborted transactions may leave gaps.
    pub fn next_sequence(
        &self,
        txn: &WriteTransaction,
        scope: &str,
        period: &str,
    ) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCES_TABLE)?;
        let current = table.get((scope, period))?.map(|g| g.value()).unwrap_or(0);
        let next = current + 1;
        table.insert((scope, period), next)?;
        Ok(next)
    }

    /// Last issued number for `(scope, period)` (read-only)
    pub fn current_sequence(&self, scope: &str, period: &str) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEQUENCES_TABLE)?;
        Ok(table.get((scope, period))?.map(|g| g.value()).unwrap_or(0))
    }

    // ========== Inventory Items ==========

    /// Store an inventory item (within transaction)
    pub fn put_inventory_item(
        &self,
        txn: &WriteTransaction,
        item: &InventoryItem,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(INVENTORY_ITEMS_TABLE)?;
        let value = serde_json::to_vec(item)?;
        table.insert(item.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get an inventory item by id
    pub fn get_inventory_item(&self, item_id: &str) -> StorageResult<Option<InventoryItem>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INVENTORY_ITEMS_TABLE)?;
        match table.get(item_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get an inventory item by id (within transaction)
    pub fn get_inventory_item_in(
        &self,
        txn: &WriteTransaction,
        item_id: &str,
    ) -> StorageResult<Option<InventoryItem>> {
        let table = txn.open_table(INVENTORY_ITEMS_TABLE)?;
        match table.get(item_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Scan all inventory items
    pub fn scan_inventory_items(&self) -> StorageResult<Vec<InventoryItem>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INVENTORY_ITEMS_TABLE)?;
        let mut items = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            items.push(serde_json::from_slice(value.value())?);
        }
        Ok(items)
    }

    // ========== Stock Transactions (append-only) ==========

    /// Append a stock transaction under the next per-item log sequence
    pub fn append_stock_transaction(
        &self,
        txn: &WriteTransaction,
        transaction: &StockTransaction,
    ) -> StorageResult<u64> {
        let seq = {
            let table = txn.open_table(STOCK_TRANSACTIONS_TABLE)?;
            let range_start = (transaction.item_id.as_str(), 0u64);
            let range_end = (transaction.item_id.as_str(), u64::MAX);
            match table.range(range_start..=range_end)?.next_back() {
                Some(result) => result?.0.value().1 + 1,
                None => 1,
            }
        };
        let mut table = txn.open_table(STOCK_TRANSACTIONS_TABLE)?;
        let value = serde_json::to_vec(transaction)?;
        table.insert((transaction.item_id.as_str(), seq), value.as_slice())?;
        Ok(seq)
    }

    /// All transactions for an item, in posting order
    pub fn get_stock_transactions(&self, item_id: &str) -> StorageResult<Vec<StockTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STOCK_TRANSACTIONS_TABLE)?;
        let mut transactions = Vec::new();
        let range_start = (item_id, 0u64);
        let range_end = (item_id, u64::MAX);
        for result in table.range(range_start..=range_end)? {
            let (_key, value) = result?;
            transactions.push(serde_json::from_slice(value.value())?);
        }
        Ok(transactions)
    }

    // ========== Recipes ==========

    /// Store a recipe, replacing any previous recipe for the product
    pub fn put_recipe(&self, txn: &WriteTransaction, recipe: &Recipe) -> StorageResult<()> {
        let mut table = txn.open_table(RECIPES_TABLE)?;
        let value = serde_json::to_vec(recipe)?;
        table.insert(recipe.product_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get the active recipe for a product
    pub fn get_recipe(&self, product_id: &str) -> StorageResult<Option<Recipe>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RECIPES_TABLE)?;
        match table.get(product_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get the active recipe for a product (within transaction)
    pub fn get_recipe_in(
        &self,
        txn: &WriteTransaction,
        product_id: &str,
    ) -> StorageResult<Option<Recipe>> {
        let table = txn.open_table(RECIPES_TABLE)?;
        match table.get(product_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Remove the recipe for a product
    pub fn delete_recipe(&self, txn: &WriteTransaction, product_id: &str) -> StorageResult<()> {
        let mut table = txn.open_table(RECIPES_TABLE)?;
        table.remove(product_id)?;
        Ok(())
    }

    // ========== Orders ==========

    /// Store an order and maintain the active-order index
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let value = serde_json::to_vec(order)?;
            table.insert(order.order_id.as_str(), value.as_slice())?;
        }
        let mut index = txn.open_table(ACTIVE_ORDERS_TABLE)?;
        if order.status.is_terminal() {
            index.remove(order.order_id.as_str())?;
        } else {
            index.insert(order.order_id.as_str(), ())?;
        }
        Ok(())
    }

    /// Get an order by id
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by id (within transaction)
    pub fn get_order_in(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Whether an order id is already taken (within transaction)
    pub fn order_exists_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let table = txn.open_table(ORDERS_TABLE)?;
        Ok(table.get(order_id)?.is_some())
    }

    /// All non-terminal orders
    pub fn list_active_orders(&self) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ACTIVE_ORDERS_TABLE)?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        let mut orders = Vec::new();
        for result in index.iter()? {
            let (key, _value) = result?;
            if let Some(guard) = table.get(key.value())? {
                orders.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(orders)
    }

    // ========== Kitchen Tickets ==========

    /// Store a ticket and maintain the order and open-ticket indexes
    pub fn put_ticket(&self, txn: &WriteTransaction, ticket: &KitchenTicket) -> StorageResult<()> {
        {
            let mut table = txn.open_table(KITCHEN_TICKETS_TABLE)?;
            let value = serde_json::to_vec(ticket)?;
            table.insert(ticket.ticket_no.as_str(), value.as_slice())?;
        }
        {
            let mut index = txn.open_table(ORDER_TICKETS_TABLE)?;
            index.insert((ticket.order_id.as_str(), ticket.ticket_no.as_str()), ())?;
        }
        let mut open = txn.open_table(OPEN_TICKETS_TABLE)?;
        let finished = matches!(
            ticket.status,
            shared::models::TicketStatus::Served | shared::models::TicketStatus::Cancelled
        );
        if finished {
            open.remove(ticket.ticket_no.as_str())?;
        } else {
            open.insert(ticket.ticket_no.as_str(), ())?;
        }
        Ok(())
    }

    /// Get a ticket by number
    pub fn get_ticket(&self, ticket_no: &str) -> StorageResult<Option<KitchenTicket>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KITCHEN_TICKETS_TABLE)?;
        match table.get(ticket_no)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a ticket by number (within transaction)
    pub fn get_ticket_in(
        &self,
        txn: &WriteTransaction,
        ticket_no: &str,
    ) -> StorageResult<Option<KitchenTicket>> {
        let table = txn.open_table(KITCHEN_TICKETS_TABLE)?;
        match table.get(ticket_no)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All tickets for an order (within transaction)
    pub fn tickets_for_order_in(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Vec<KitchenTicket>> {
        let ticket_nos = {
            let index = txn.open_table(ORDER_TICKETS_TABLE)?;
            let range_start = (order_id, "");
            let range_end = (order_id, "\u{10ffff}");
            let mut nos = Vec::new();
            for result in index.range(range_start..=range_end)? {
                let (key, _value) = result?;
                nos.push(key.value().1.to_string());
            }
            nos
        };
        let table = txn.open_table(KITCHEN_TICKETS_TABLE)?;
        let mut tickets = Vec::new();
        for no in ticket_nos {
            if let Some(guard) = table.get(no.as_str())? {
                tickets.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(tickets)
    }

    /// All tickets for an order
    pub fn tickets_for_order(&self, order_id: &str) -> StorageResult<Vec<KitchenTicket>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ORDER_TICKETS_TABLE)?;
        let table = read_txn.open_table(KITCHEN_TICKETS_TABLE)?;
        let mut tickets = Vec::new();
        let range_start = (order_id, "");
        let range_end = (order_id, "\u{10ffff}");
        for result in index.range(range_start..=range_end)? {
            let (key, _value) = result?;
            if let Some(guard) = table.get(key.value().1)? {
                tickets.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(tickets)
    }

    /// All tickets still pending or in preparation
    pub fn list_open_tickets(&self) -> StorageResult<Vec<KitchenTicket>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OPEN_TICKETS_TABLE)?;
        let table = read_txn.open_table(KITCHEN_TICKETS_TABLE)?;
        let mut tickets = Vec::new();
        for result in index.iter()? {
            let (key, _value) = result?;
            if let Some(guard) = table.get(key.value())? {
                tickets.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(tickets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_counter_is_monotonic_per_key() {
        let store = Store::open_in_memory().unwrap();

        let txn = store.begin_write().unwrap();
        assert_eq!(store.next_sequence(&txn, "ORD", "20260823").unwrap(), 1);
        assert_eq!(store.next_sequence(&txn, "ORD", "20260823").unwrap(), 2);
        assert_eq!(store.next_sequence(&txn, "KOT", "20260823").unwrap(), 1);
        assert_eq!(store.next_sequence(&txn, "ORD", "20260824").unwrap(), 1);
        txn.commit().unwrap();

        assert_eq!(store.current_sequence("ORD", "20260823").unwrap(), 2);
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boh.redb");

        {
            let store = Store::open(&path).unwrap();
            let txn = store.begin_write().unwrap();
            store.next_sequence(&txn, "ORD", "20260823").unwrap();
            txn.commit().unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.current_sequence("ORD", "20260823").unwrap(), 1);
    }

    #[test]
    fn aborted_transaction_has_no_effect() {
        let store = Store::open_in_memory().unwrap();

        {
            let txn = store.begin_write().unwrap();
            store.next_sequence(&txn, "ORD", "20260823").unwrap();
            // dropped without commit
        }

        assert_eq!(store.current_sequence("ORD", "20260823").unwrap(), 0);
    }
}
