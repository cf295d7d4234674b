//! Transactional persistence for the marketplace core.
//!
//! The [`Store`] trait opens [`UnitOfWork`]s: every mutation of inventory,
//! orders and payouts happens inside one, and is committed or rolled back
//! as a group. Two implementations are provided: [`InMemoryStore`] and
//! [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use records::{Inventory, Order, OrderItem, Payout, constraints};
pub use store::{Store, StoreExt, UnitOfWork};
