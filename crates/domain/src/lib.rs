//! Marketplace core: order placement, inventory ledger, order status state
//! machine and seller payouts.
//!
//! All mutations go through a [`store::UnitOfWork`]. The services in this
//! crate own the commit/rollback boundary; the ledger functions they call only
//! ever run inside a unit of work handed to them.
//!
//! [`Marketplace`] wires the services together around one store and one
//! [`Catalog`].

pub mod catalog;
pub mod code;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod marketplace;
pub mod payout;
pub mod placement;
pub mod retry;

pub use catalog::{Actor, Catalog, CatalogSeed, InMemoryCatalog, Product, UserProfile};
pub use code::{CodeGenerator, compose_code};
pub use config::{MarketConfig, RolePolicy};
pub use error::MarketError;
pub use ledger::{Contribution, InventoryService};
pub use lifecycle::{OrderLifecycle, check_payment, check_transition};
pub use marketplace::{Marketplace, PaymentOutcome, PaymentSignal};
pub use payout::{PayoutScheduler, order_total, seller_totals};
pub use placement::{LineRequest, OrderCoordinator, OrderDetails};
pub use retry::with_retries;
