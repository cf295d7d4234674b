//! Inventory ledger: the only code that changes a lot's quantity.
//!
//! The free functions run inside a unit of work owned by the caller and never
//! commit. [`InventoryService`] wraps them in units of work of its own for
//! standalone stock adjustments.

use std::sync::Arc;

use common::{InventoryId, ProductId, UserId};
use serde::Serialize;
use store::{Inventory, Store, UnitOfWork};

use crate::catalog::{Actor, Catalog};
use crate::code::CodeGenerator;
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::retry::with_retries;

fn ensure_positive(amount: i64) -> Result<(), MarketError> {
    if amount > 0 {
        Ok(())
    } else {
        Err(MarketError::InvalidRequest(format!(
            "quantity must be positive, got {amount}"
        )))
    }
}

fn check_available(lot: Inventory, requested: i64) -> Result<Inventory, MarketError> {
    if requested > lot.quantity {
        return Err(MarketError::InsufficientStock {
            inventory_id: lot.id,
            requested,
            available: lot.quantity,
        });
    }
    Ok(lot)
}

/// Locks the lot of `(owner_id, product_id)` and checks it holds at least
/// `requested` units. The lock is held until the caller's unit of work ends.
pub async fn reserve_stock<T: UnitOfWork>(
    tx: &mut T,
    owner_id: UserId,
    product_id: ProductId,
    requested: i64,
) -> Result<Inventory, MarketError> {
    let lot = tx
        .lock_inventory_for(owner_id, product_id)
        .await?
        .ok_or_else(|| {
            MarketError::not_found("Inventory", format!("owner {owner_id}, product {product_id}"))
        })?;
    check_available(lot, requested)
}

/// Same as [`reserve_stock`] for a lot addressed by id.
pub async fn reserve_lot<T: UnitOfWork>(
    tx: &mut T,
    lot_id: InventoryId,
    requested: i64,
) -> Result<Inventory, MarketError> {
    let lot = tx
        .lock_inventory(lot_id)
        .await?
        .ok_or_else(|| MarketError::not_found("Inventory", lot_id))?;
    check_available(lot, requested)
}

/// Subtracts `amount` units from a lot, attributing the change to `actor`.
pub async fn decrease<T: UnitOfWork>(
    tx: &mut T,
    lot_id: InventoryId,
    amount: i64,
    actor: UserId,
) -> Result<Inventory, MarketError> {
    ensure_positive(amount)?;

    match tx.decrement_inventory(lot_id, amount, actor).await? {
        Some(lot) => Ok(lot),
        // nothing matched: tell a missing lot apart from a short one
        None => match tx.lock_inventory(lot_id).await? {
            Some(lot) => Err(MarketError::InsufficientStock {
                inventory_id: lot_id,
                requested: amount,
                available: lot.quantity,
            }),
            None => Err(MarketError::not_found("Inventory", lot_id)),
        },
    }
}

/// Adds `amount` units to a lot.
pub async fn increase<T: UnitOfWork>(
    tx: &mut T,
    lot_id: InventoryId,
    amount: i64,
    actor: UserId,
) -> Result<Inventory, MarketError> {
    ensure_positive(amount)?;

    tx.increment_inventory(lot_id, amount, actor)
        .await?
        .ok_or_else(|| MarketError::not_found("Inventory", lot_id))
}

/// Outcome of [`create_or_increase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub lot: Inventory,
    /// True when a new lot was created.
    pub created: bool,
}

/// Adds stock to the lot of `(owner_id, product_id)`, creating the lot with a
/// code from `new_code` if the owner has none for that product yet.
pub async fn create_or_increase<T, F>(
    tx: &mut T,
    owner_id: UserId,
    product_id: ProductId,
    amount: i64,
    actor: UserId,
    new_code: F,
) -> Result<Contribution, MarketError>
where
    T: UnitOfWork,
    F: FnOnce() -> String + Send,
{
    ensure_positive(amount)?;

    if let Some(existing) = tx.lock_inventory_for(owner_id, product_id).await? {
        let lot = increase(tx, existing.id, amount, actor).await?;
        return Ok(Contribution { lot, created: false });
    }

    let lot = Inventory::new(new_code(), owner_id, product_id, amount, actor);
    tx.insert_inventory(&lot).await?;
    Ok(Contribution { lot, created: true })
}

/// Standalone stock adjustments, each in its own unit of work.
pub struct InventoryService<S, C> {
    store: S,
    catalog: C,
    codes: CodeGenerator,
    config: Arc<MarketConfig>,
}

impl<S: Store, C: Catalog> InventoryService<S, C> {
    pub fn new(store: S, catalog: C, codes: CodeGenerator, config: Arc<MarketConfig>) -> Self {
        Self {
            store,
            catalog,
            codes,
            config,
        }
    }

    fn authorize(&self, actor: &Actor, owner_id: UserId) -> Result<(), MarketError> {
        actor.require(&self.config.roles.contribute_stock, "manage stock")?;
        if actor.id != owner_id && !actor.is_admin() {
            return Err(MarketError::Forbidden {
                action: "manage another seller's stock",
            });
        }
        Ok(())
    }

    /// Adds stock for `(owner_id, product_id)`, creating the lot on first
    /// contribution.
    ///
    /// A lot code collision is retried with a fresh code up to the configured
    /// retry budget, then reported as `Conflict`.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn contribute_stock(
        &self,
        owner_id: UserId,
        product_id: ProductId,
        amount: i64,
        actor: &Actor,
    ) -> Result<Contribution, MarketError> {
        self.authorize(actor, owner_id)?;
        ensure_positive(amount)?;

        let owner = self.catalog.get_user(owner_id).await?;
        let product = self.catalog.get_product(product_id).await?;

        let store = &self.store;
        let codes = &self.codes;
        let first_name = owner.first_name.as_str();
        let category = product.category.as_str();
        let actor_id = actor.id;

        let contribution = with_retries(self.config.max_commit_retries, "contribute_stock", move || async move {
            let mut tx = store.begin().await?;
            let contribution = create_or_increase(&mut tx, owner_id, product_id, amount, actor_id, || {
                codes.generate(first_name, category)
            })
            .await?;
            tx.commit().await?;
            Ok(contribution)
        })
        .await?;

        let kind = if contribution.created { "created" } else { "increased" };
        metrics::counter!("inventory_adjustments_total", "kind" => kind).increment(1);
        tracing::info!(
            lot_id = %contribution.lot.id,
            code = %contribution.lot.code,
            quantity = contribution.lot.quantity,
            kind,
            "stock contributed"
        );

        Ok(contribution)
    }

    /// Adds `amount` units to an existing lot.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn increase(
        &self,
        lot_id: InventoryId,
        amount: i64,
        actor: &Actor,
    ) -> Result<Inventory, MarketError> {
        let mut tx = self.store.begin().await?;
        let lot = tx
            .lock_inventory(lot_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Inventory", lot_id))?;
        self.authorize(actor, lot.owner_id)?;

        let lot = increase(&mut tx, lot_id, amount, actor.id).await?;
        tx.commit().await?;

        metrics::counter!("inventory_adjustments_total", "kind" => "increased").increment(1);
        Ok(lot)
    }

    /// Removes `amount` units from an existing lot.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn decrease(
        &self,
        lot_id: InventoryId,
        amount: i64,
        actor: &Actor,
    ) -> Result<Inventory, MarketError> {
        let mut tx = self.store.begin().await?;
        let lot = tx
            .lock_inventory(lot_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Inventory", lot_id))?;
        self.authorize(actor, lot.owner_id)?;

        let lot = decrease(&mut tx, lot_id, amount, actor.id).await?;
        tx.commit().await?;

        metrics::counter!("inventory_adjustments_total", "kind" => "decreased").increment(1);
        Ok(lot)
    }

    pub async fn get_inventory(&self, lot_id: InventoryId) -> Result<Inventory, MarketError> {
        self.store
            .get_inventory(lot_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Inventory", lot_id))
    }
}
