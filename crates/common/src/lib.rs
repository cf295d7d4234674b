//! Shared types for the marketplace core: identifiers, statuses and roles.

pub mod roles;
pub mod status;
pub mod types;

pub use roles::{Role, RoleSet, has_any_role};
pub use status::{OrderStatus, ParseStatusError, PaymentStatus};
pub use types::{InventoryId, OrderId, OrderItemId, PayoutId, ProductId, UserId};
