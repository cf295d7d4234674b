//! Wiring of the marketplace services around one store and one catalog.

use std::sync::Arc;

use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use store::{Order, Payout, Store, UnitOfWork};

use crate::catalog::{Actor, Catalog};
use crate::code::CodeGenerator;
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ledger::InventoryService;
use crate::lifecycle::{self, OrderLifecycle};
use crate::payout::{self, PayoutScheduler, seller_totals};
use crate::placement::OrderCoordinator;

/// An external payment confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSignal {
    pub order_id: OrderId,
    pub paid: bool,
}

/// Result of [`Marketplace::apply_payment_signal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub order: Order,
    /// Payouts created by this signal.
    pub payouts: Vec<Payout>,
}

/// Entry point bundling every marketplace service.
pub struct Marketplace<S, C> {
    catalog: C,
    store: S,
    config: Arc<MarketConfig>,
    orders: OrderCoordinator<S, C>,
    lifecycle: OrderLifecycle<S>,
    inventory: InventoryService<S, C>,
    payouts: PayoutScheduler<S>,
}

impl<S, C> Marketplace<S, C>
where
    S: Store + Clone,
    C: Catalog + Clone,
{
    pub fn new(store: S, catalog: C, config: MarketConfig) -> Self {
        let codes = CodeGenerator::new(config.code_filler);
        Self::with_codes(store, catalog, config, codes)
    }

    /// Builds the services around a specific code generator.
    pub fn with_codes(store: S, catalog: C, config: MarketConfig, codes: CodeGenerator) -> Self {
        let config = Arc::new(config);
        Self {
            orders: OrderCoordinator::new(
                store.clone(),
                catalog.clone(),
                codes.clone(),
                config.clone(),
            ),
            lifecycle: OrderLifecycle::new(store.clone(), config.clone()),
            inventory: InventoryService::new(store.clone(), catalog.clone(), codes, config.clone()),
            payouts: PayoutScheduler::new(store.clone()),
            catalog,
            store,
            config,
        }
    }

    pub fn orders(&self) -> &OrderCoordinator<S, C> {
        &self.orders
    }

    pub fn lifecycle(&self) -> &OrderLifecycle<S> {
        &self.lifecycle
    }

    pub fn inventory(&self) -> &InventoryService<S, C> {
        &self.inventory
    }

    pub fn payouts(&self) -> &PayoutScheduler<S> {
        &self.payouts
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Resolves a user id into an actor through the catalog.
    pub async fn actor(&self, user_id: UserId) -> Result<Actor, MarketError> {
        Ok(self.catalog.get_user(user_id).await?.actor())
    }

    /// Records a payment result and, when paid, schedules one payout per
    /// seller in the same unit of work.
    ///
    /// Amounts come from the unit prices captured on the order items. Sellers
    /// that already have a payout are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn apply_payment_signal(
        &self,
        signal: PaymentSignal,
    ) -> Result<PaymentOutcome, MarketError> {
        let mut tx = self.store.begin().await?;
        let order =
            lifecycle::record_payment(&mut tx, signal.order_id, signal.paid, self.config.system_user)
                .await?;

        let mut payouts = Vec::new();
        if signal.paid {
            let items = tx.order_items(order.id).await?;
            for (seller_id, amount) in seller_totals(&items)? {
                match payout::insert_payout(&mut tx, &order, &items, seller_id, amount).await {
                    Ok(payout) => payouts.push(payout),
                    Err(MarketError::Conflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        tx.commit().await?;

        metrics::counter!("payouts_scheduled_total").increment(payouts.len() as u64);
        tracing::info!(
            order_id = %order.id,
            payment = %order.payment_status,
            payouts = payouts.len(),
            "payment signal applied"
        );

        Ok(PaymentOutcome { order, payouts })
    }
}
