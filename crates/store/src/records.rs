//! Persisted row types.

use chrono::{DateTime, Utc};
use common::{
    InventoryId, OrderId, OrderItemId, OrderStatus, PaymentStatus, PayoutId, ProductId, UserId,
};
use serde::{Deserialize, Serialize};

/// Names of the storage-level uniqueness constraints.
///
/// Both store implementations report violations under these names so callers
/// can tell a code collision apart from a duplicate payout.
pub mod constraints {
    pub const INVENTORY_CODE: &str = "inventories_code_key";
    pub const INVENTORY_OWNER_PRODUCT: &str = "inventories_owner_product_key";
    pub const ORDER_CODE: &str = "orders_code_key";
    pub const PAYOUT_ORDER_SELLER: &str = "payouts_order_seller_key";
}

/// An inventory lot: one seller's stock of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub id: InventoryId,

    /// Human-legible lot code, unique and immutable.
    pub code: String,

    /// The seller who owns this stock.
    pub owner_id: UserId,

    pub product_id: ProductId,

    /// Units on hand. Never negative.
    pub quantity: i64,

    /// The user who last changed this lot.
    pub updated_by: UserId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    /// Creates a new lot for `(owner_id, product_id)`.
    pub fn new(
        code: impl Into<String>,
        owner_id: UserId,
        product_id: ProductId,
        quantity: i64,
        updated_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InventoryId::new(),
            code: code.into(),
            owner_id,
            product_id,
            quantity,
            updated_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub code: String,
    pub buyer_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order header in the initial `PENDING / PENDING` state.
    pub fn pending(code: impl Into<String>, buyer_id: UserId, updated_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            code: code.into(),
            buyer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            updated_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One line of an order, sold from a single inventory lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub inventory_id: InventoryId,

    /// Owner of the lot at the time of sale.
    pub seller_id: UserId,

    pub quantity: i64,

    /// Unit price in minor currency units at the time of sale.
    pub unit_price: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(
        order_id: OrderId,
        inventory_id: InventoryId,
        seller_id: UserId,
        quantity: i64,
        unit_price: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderItemId::new(),
            order_id,
            inventory_id,
            seller_id,
            quantity,
            unit_price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `unit_price * quantity`, or `None` if it does not fit an `i64`.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A payout owed to one seller for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub order_id: OrderId,
    pub seller_id: UserId,

    /// Amount in minor currency units.
    pub amount: i64,

    pub status: PaymentStatus,

    /// Set when the payout reaches a terminal status.
    pub processed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// Creates a new payout in the `PENDING` state.
    pub fn pending(order_id: OrderId, seller_id: UserId, amount: i64) -> Self {
        let now = Utc::now();
        Self {
            id: PayoutId::new(),
            order_id,
            seller_id,
            amount,
            status: PaymentStatus::Pending,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
