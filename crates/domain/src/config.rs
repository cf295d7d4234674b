//! Marketplace configuration.

use common::{OrderStatus, Role, UserId};
use serde::{Deserialize, Serialize};

/// Roles required for each guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub contribute_stock: Vec<Role>,
    pub place_order: Vec<Role>,
    /// Moving an order forward (processing, shipping, delivered, returned).
    pub fulfil: Vec<Role>,
    pub cancel: Vec<Role>,
    pub settle_payouts: Vec<Role>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            contribute_stock: vec![Role::Seller, Role::Admin],
            place_order: vec![Role::Buyer, Role::Admin],
            fulfil: vec![Role::Seller, Role::Admin],
            cancel: vec![Role::Buyer, Role::Seller, Role::Admin],
            settle_payouts: vec![Role::Admin],
        }
    }
}

impl RolePolicy {
    /// Roles allowed to move an order into `target`.
    pub fn for_status(&self, target: OrderStatus) -> &[Role] {
        match target {
            OrderStatus::Cancelled => &self.cancel,
            _ => &self.fulfil,
        }
    }
}

/// Settings shared by every marketplace service.
///
/// Built once at startup and handed to the services by `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// How many times a failed unit of work is re-run from scratch.
    pub max_commit_retries: u32,

    /// Pads name fragments shorter than four characters in generated codes.
    pub code_filler: char,

    /// Return an order's items to their lots when it is cancelled.
    pub restock_on_cancel: bool,

    /// Recorded as `updated_by` for changes driven by payment signals.
    pub system_user: UserId,

    pub roles: RolePolicy,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 1,
            code_filler: 'X',
            restock_on_cancel: true,
            system_user: UserId::from_uuid(uuid::Uuid::nil()),
            roles: RolePolicy::default(),
        }
    }
}
