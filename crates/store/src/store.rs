use async_trait::async_trait;
use common::{InventoryId, OrderId, OrderStatus, PaymentStatus, PayoutId, ProductId, UserId};

use crate::{Inventory, Order, OrderItem, Payout, Result};

/// A transactional boundary: every write made through a unit of work is
/// committed together or not at all.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it
/// back and releases every lock it holds. Callers that abort mid-way (an
/// error returned with `?`, a cancelled future) therefore never leave partial
/// writes behind.
///
/// Methods prefixed with `lock_` acquire a lock on the returned row that is
/// held until the unit of work ends.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads and locks an inventory lot by id.
    async fn lock_inventory(&mut self, id: InventoryId) -> Result<Option<Inventory>>;

    /// Loads and locks the lot owned by `owner_id` for `product_id`.
    async fn lock_inventory_for(
        &mut self,
        owner_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Inventory>>;

    /// Inserts a new lot.
    ///
    /// Fails with `UniqueViolation` if the code or the (owner, product) pair
    /// is already taken.
    async fn insert_inventory(&mut self, lot: &Inventory) -> Result<()>;

    /// Subtracts `amount` from the lot's quantity if and only if the lot holds
    /// at least `amount` units.
    ///
    /// Returns the updated lot, or `None` when the lot is absent or the
    /// condition did not hold (no row affected).
    async fn decrement_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>>;

    /// Adds `amount` to the lot's quantity. Returns `None` if the lot is absent.
    async fn increment_inventory(
        &mut self,
        id: InventoryId,
        amount: i64,
        actor: UserId,
    ) -> Result<Option<Inventory>>;

    /// Inserts an order header. Fails with `UniqueViolation` on a code collision.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts an order item bound to an existing order.
    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()>;

    /// Loads and locks an order header.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Returns the items of an order as seen by this unit of work.
    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Sets the order status to `next` if it currently equals `expected`.
    ///
    /// Returns `None` when the order is absent or its status has moved on.
    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        actor: UserId,
    ) -> Result<Option<Order>>;

    /// Sets the payment status to `next` if it currently equals `expected`.
    async fn update_payment_status(
        &mut self,
        id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        actor: UserId,
    ) -> Result<Option<Order>>;

    /// Finds the payout for `(order_id, seller_id)`, if any.
    async fn find_payout(&mut self, order_id: OrderId, seller_id: UserId)
    -> Result<Option<Payout>>;

    /// Loads and locks a payout.
    async fn lock_payout(&mut self, id: PayoutId) -> Result<Option<Payout>>;

    /// Inserts a payout. Fails with `UniqueViolation` if one already exists
    /// for the same (order, seller) pair.
    async fn insert_payout(&mut self, payout: &Payout) -> Result<()>;

    /// Moves a payout from `expected` to `next`, stamping `processed_at`.
    async fn complete_payout(
        &mut self,
        id: PayoutId,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<Option<Payout>>;

    /// Makes every write of this unit of work durable.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this unit of work.
    async fn rollback(self) -> Result<()>;
}

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The unit of work type produced by [`Store::begin`].
    type Tx: UnitOfWork;

    /// Opens a new unit of work.
    ///
    /// Fails with `LockTimeout` if the required locks cannot be acquired
    /// within the store's lock timeout.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Reads a lot outside of any unit of work.
    async fn get_inventory(&self, id: InventoryId) -> Result<Option<Inventory>>;

    /// Reads an order header outside of any unit of work.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Reads an order's items outside of any unit of work.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    async fn get_payout(&self, id: PayoutId) -> Result<Option<Payout>>;

    /// Lists the payouts recorded for an order.
    async fn list_payouts(&self, order_id: OrderId) -> Result<Vec<Payout>>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Loads an order header together with its items.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order_with_items(&self, id: OrderId) -> Result<Option<(Order, Vec<OrderItem>)>> {
        match self.get_order(id).await? {
            Some(order) => {
                let items = self.get_order_items(id).await?;
                Ok(Some((order, items)))
            }
            None => Ok(None),
        }
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
