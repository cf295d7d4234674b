use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{InventoryId, OrderId, OrderStatus, PaymentStatus, PayoutId, ProductId, UserId};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::{
    Inventory, Order, OrderItem, Payout, Result, StoreError,
    records::constraints,
    store::{Store, UnitOfWork},
};

/// Default time a unit of work waits for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct Tables {
    inventories: HashMap<InventoryId, Inventory>,
    orders: HashMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    payouts: HashMap<PayoutId, Payout>,
}

impl Tables {
    fn items_of(&self, order_id: OrderId) -> Vec<OrderItem> {
        let mut items: Vec<_> = self
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.created_at);
        items
    }

    fn payouts_of(&self, order_id: OrderId) -> Vec<Payout> {
        let mut payouts: Vec<_> = self
            .payouts
            .values()
            .filter(|payout| payout.order_id == order_id)
            .cloned()
            .collect();
        payouts.sort_by_key(|payout| payout.created_at);
        payouts
    }
}

/// In-memory store implementation for testing and single-process deployments.
///
/// A unit of work holds one lock over all tables for its whole lifetime,
/// which serialises writers the same way a row lock serialises writers of
/// the same row. Writes go to a private copy that replaces the shared
/// tables only on commit, so a dropped unit of work leaves no trace.
///
/// Reads through [`Store`] wait for the same lock; calling them while the
/// current task holds an open unit of work times out with `LockTimeout`.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
    commit_faults: Arc<AtomicU32>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            commit_faults: Arc::default(),
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a unit of work waits for the store lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Makes the next `count` commits fail with `CommitFailed`.
    pub fn fail_next_commits(&self, count: u32) {
        self.commit_faults.store(count, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the total number of order items stored.
    pub async fn order_item_count(&self) -> usize {
        self.tables.lock().await.order_items.len()
    }

    /// Returns the total number of payouts stored.
    pub async fn payout_count(&self) -> usize {
        self.tables.lock().await.payouts.len()
    }

    /// Inserts a lot directly, bypassing units of work. Intended for seeding.
    pub async fn seed_inventory(&self, lot: Inventory) {
        self.tables.lock().await.inventories.insert(lot.id, lot);
    }

    async fn read(&self) -> Result<MutexGuard<'_, Tables>> {
        tokio::time::timeout(self.lock_timeout, self.tables.lock())
            .await
            .map_err(|_| StoreError::LockTimeout)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = tokio::time::timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        let working = Tables::clone(&guard);

        Ok(InMemoryUnitOfWork {
            guard,
            working,
            commit_faults: self.commit_faults.clone(),
        })
    }

    async fn get_inventory(&self, id: InventoryId) -> Result<Option<Inventory>> {
        Ok(self.read().await?.inventories.get(&id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.read().await?.orders.get(&id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.read().await?.items_of(order_id))
    }

    async fn get_payout(&self, id: PayoutId) -> Result<Option<Payout>> {
        Ok(self.read().await?.payouts.get(&id).cloned())
    }

    async fn list_payouts(&self, order_id: OrderId) -> Result<Vec<Payout>> {
        Ok(self.read().await?.payouts_of(order_id))
    }
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    commit_faults: Arc<AtomicU32>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<Inventory>> {
        Ok(self.working.inventories.get(&id).cloned())
    }

    async fn lock_inventory_for(
        &mut self,
        owner_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Inventory>> {
        Ok(self
            .working
            .inventories
            .values()
            .find(|lot| lot.owner_id == owner_id && lot.product_id == product_id)
            .cloned())
    }

    async fn insert_inventory(&mut self, lot: &Inventory) -> Result<()> {
        let inventories = &self.working.inventories;
        if inventories.values().any(|existing| existing.code == lot.code) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::INVENTORY_CODE.to_string(),
            });
        }
        if inventories.values().any(|existing| {
            existing.owner_id == lot.owner_id && existing.product_id == lot.product_id
        }) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::INVENTORY_OWNER_PRODUCT.to_string(),
            });
        }

        self.working.inventories.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn decrement_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>> {
        match self.working.inventories.get_mut(&id) {
            Some(lot) if lot.quantity >= amount => {
                lot.quantity -= amount;
                lot.updated_by = actor;
                lot.updated_at = Utc::now();
                Ok(Some(lot.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn increment_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>> {
        let Some(lot) = self.working.inventories.get_mut(&id) else {
            return Ok(None);
        };
        let current = lot.quantity;
        lot.quantity = current.checked_add(amount).ok_or_else(|| {
            StoreError::OutOfRange(format!("inventory {id} quantity {current} + {amount}"))
        })?;
        lot.updated_by = actor;
        lot.updated_at = Utc::now();
        Ok(Some(lot.clone()))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self
            .working
            .orders
            .values()
            .any(|existing| existing.code == order.code)
        {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::ORDER_CODE.to_string(),
            });
        }

        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        if !self.working.orders.contains_key(&item.order_id) {
            return Err(StoreError::NotFound {
                entity: "Order",
                id: item.order_id.to_string(),
            });
        }
        if !self.working.inventories.contains_key(&item.inventory_id) {
            return Err(StoreError::NotFound {
                entity: "Inventory",
                id: item.inventory_id.to_string(),
            });
        }

        self.working.order_items.push(item.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.working.items_of(order_id))
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        actor: UserId,
    ) -> Result<Option<Order>> {
        match self.working.orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = next;
                order.updated_by = actor;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_payment_status(
        &mut self,
        id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        actor: UserId,
    ) -> Result<Option<Order>> {
        match self.working.orders.get_mut(&id) {
            Some(order) if order.payment_status == expected => {
                order.payment_status = next;
                order.updated_by = actor;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_payout(
        &mut self,
        order_id: OrderId,
        seller_id: UserId,
    ) -> Result<Option<Payout>> {
        Ok(self
            .working
            .payouts
            .values()
            .find(|payout| payout.order_id == order_id && payout.seller_id == seller_id)
            .cloned())
    }

    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<Payout>> {
        Ok(self.working.payouts.get(&id).cloned())
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        if !self.working.orders.contains_key(&payout.order_id) {
            return Err(StoreError::NotFound {
                entity: "Order",
                id: payout.order_id.to_string(),
            });
        }
        if self.working.payouts.values().any(|existing| {
            existing.order_id == payout.order_id && existing.seller_id == payout.seller_id
        }) {
            return Err(StoreError::UniqueViolation {
                constraint: constraints::PAYOUT_ORDER_SELLER.to_string(),
            });
        }

        self.working.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn complete_payout(
        &mut self,
        id: PayoutId,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Option<Payout>> {
        match self.working.payouts.get_mut(&id) {
            Some(payout) if payout.status == expected => {
                let now = Utc::now();
                payout.status = next;
                payout.processed_at = Some(now);
                payout.updated_at = now;
                Ok(Some(payout.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn commit(self) -> Result<()> {
        let injected = self
            .commit_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!("failing commit on request");
            return Err(StoreError::CommitFailed("injected commit failure".to_string()));
        }

        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(quantity: i64) -> Inventory {
        let owner = UserId::new();
        Inventory::new("SELLBK26AB", owner, ProductId::new(), quantity, owner)
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryStore::new();
        let lot = lot(10);

        let mut tx = store.begin().await.unwrap();
        tx.insert_inventory(&lot).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_inventory(lot.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 10);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();
        let lot = lot(10);
        store.seed_inventory(lot.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            let updated = tx
                .decrement_inventory(lot.id, 4, UserId::new())
                .await
                .unwrap();
            assert_eq!(updated.unwrap().quantity, 6);
            // dropped without commit
        }

        let stored = store.get_inventory(lot.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 10);
    }

    #[tokio::test]
    async fn explicit_rollback_discards_writes() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::pending("CODE1", buyer, buyer))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn conditional_decrement_refuses_overdraw() {
        let store = InMemoryStore::new();
        let lot = lot(3);
        store.seed_inventory(lot.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .decrement_inventory(lot.id, 4, UserId::new())
            .await
            .unwrap();
        assert!(result.is_none());

        let missing = tx
            .decrement_inventory(InventoryId::new(), 1, UserId::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn increment_refuses_to_overflow() {
        let store = InMemoryStore::new();
        let lot = lot(i64::MAX - 1);
        store.seed_inventory(lot.clone()).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .increment_inventory(lot.id, 2, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange(_)));
        drop(tx);

        let stored = store.get_inventory(lot.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, i64::MAX - 1);
    }

    #[tokio::test]
    async fn unique_lot_code_and_owner_product() {
        let store = InMemoryStore::new();
        let first = lot(1);
        store.seed_inventory(first.clone()).await;

        let mut tx = store.begin().await.unwrap();

        let same_code = Inventory::new(&first.code, UserId::new(), ProductId::new(), 1, first.owner_id);
        let err = tx.insert_inventory(&same_code).await.unwrap_err();
        assert_eq!(err.violated_constraint(), Some(constraints::INVENTORY_CODE));

        let same_pair = Inventory::new("OTHER", first.owner_id, first.product_id, 1, first.owner_id);
        let err = tx.insert_inventory(&same_pair).await.unwrap_err();
        assert_eq!(
            err.violated_constraint(),
            Some(constraints::INVENTORY_OWNER_PRODUCT)
        );
    }

    #[tokio::test]
    async fn unique_payout_per_order_and_seller() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();
        let seller = UserId::new();
        let order = Order::pending("ORDER1", buyer, buyer);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.insert_payout(&Payout::pending(order.id, seller, 100))
            .await
            .unwrap();
        let err = tx
            .insert_payout(&Payout::pending(order.id, seller, 100))
            .await
            .unwrap_err();
        assert_eq!(
            err.violated_constraint(),
            Some(constraints::PAYOUT_ORDER_SELLER)
        );
    }

    #[tokio::test]
    async fn conditional_status_update() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();
        let order = Order::pending("ORDER2", buyer, buyer);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();

        let stale = tx
            .update_order_status(order.id, OrderStatus::Shipping, OrderStatus::Delivered, buyer)
            .await
            .unwrap();
        assert!(stale.is_none());

        let updated = tx
            .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled, buyer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn injected_commit_failure_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let buyer = UserId::new();
        store.fail_next_commits(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::pending("ORDER3", buyer, buyer))
            .await
            .unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::CommitFailed(_)));
        assert_eq!(store.order_count().await, 0);

        // Only the configured number of commits fail.
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::pending("ORDER3", buyer, buyer))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn second_unit_of_work_times_out_while_first_is_open() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(20));

        let _held = store.begin().await.unwrap();
        let result = store.begin().await;
        assert!(matches!(result, Err(StoreError::LockTimeout)));
    }

    #[tokio::test]
    async fn lock_is_released_after_commit() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(20));

        let tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.begin().await.is_ok());
    }
}
