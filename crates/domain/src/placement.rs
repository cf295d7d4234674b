//! Order placement: the transaction that turns stock into an order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use common::{InventoryId, OrderId, UserId};
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, Store, StoreExt, UnitOfWork};

use crate::catalog::{Actor, Catalog, Product, UserProfile};
use crate::code::CodeGenerator;
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ledger;
use crate::payout::{order_total, seller_totals};
use crate::retry::with_retries;

/// One requested line: `quantity` units from one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub inventory_id: InventoryId,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(inventory_id: InventoryId, quantity: i64) -> Self {
        Self {
            inventory_id,
            quantity,
        }
    }
}

/// An order header together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetails {
    /// Sum of all line totals.
    pub fn total(&self) -> Result<i64, MarketError> {
        order_total(&self.items)
    }

    /// Amount owed to each seller represented in the order.
    pub fn seller_totals(&self) -> Result<BTreeMap<UserId, i64>, MarketError> {
        seller_totals(&self.items)
    }
}

/// Places orders.
///
/// Reservation, order creation, item creation and the inventory decrements of
/// one placement share a single unit of work.
pub struct OrderCoordinator<S, C> {
    store: S,
    catalog: C,
    codes: CodeGenerator,
    config: Arc<MarketConfig>,
}

impl<S: Store, C: Catalog> OrderCoordinator<S, C> {
    pub fn new(store: S, catalog: C, codes: CodeGenerator, config: Arc<MarketConfig>) -> Self {
        Self {
            store,
            catalog,
            codes,
            config,
        }
    }

    /// Places an order for `buyer_id` on behalf of `actor`.
    ///
    /// Either the order, all its items and all inventory decrements are
    /// committed, or nothing is. Storage failures and code collisions re-run
    /// the whole placement against fresh state, up to the configured retry
    /// budget.
    #[tracing::instrument(skip(self, lines, actor), fields(actor = %actor.id, lines = lines.len()))]
    pub async fn place_order(
        &self,
        buyer_id: UserId,
        lines: &[LineRequest],
        actor: &Actor,
    ) -> Result<OrderDetails, MarketError> {
        let started = Instant::now();

        let result = self.place_order_inner(buyer_id, lines, actor).await;

        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(details) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %details.order.id,
                    code = %details.order.code,
                    items = details.items.len(),
                    total = details.total().ok(),
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("order_placement_failures_total", "reason" => e.kind())
                    .increment(1);
                tracing::debug!(reason = e.kind(), error = %e, "order rejected");
            }
        }
        result
    }

    async fn place_order_inner(
        &self,
        buyer_id: UserId,
        lines: &[LineRequest],
        actor: &Actor,
    ) -> Result<OrderDetails, MarketError> {
        actor.require(&self.config.roles.place_order, "place orders")?;
        if actor.id != buyer_id && !actor.is_admin() {
            return Err(MarketError::Forbidden {
                action: "place orders for another buyer",
            });
        }
        validate_lines(lines)?;

        let buyer = self.catalog.get_user(buyer_id).await?;

        let buyer = &buyer;
        let actor_id = actor.id;
        with_retries(self.config.max_commit_retries, "place_order", move || async move {
            self.try_place(buyer, lines, actor_id).await
        })
        .await
    }

    async fn try_place(
        &self,
        buyer: &UserProfile,
        lines: &[LineRequest],
        actor_id: UserId,
    ) -> Result<OrderDetails, MarketError> {
        let requested = requested_per_lot(lines)?;

        let mut tx = self.store.begin().await?;

        // Reserve every lot before writing anything. Lots are locked in id
        // order so that orders over overlapping lots cannot deadlock.
        let mut lots = HashMap::with_capacity(requested.len());
        for (&lot_id, &quantity) in &requested {
            let lot = ledger::reserve_lot(&mut tx, lot_id, quantity).await?;
            lots.insert(lot_id, lot);
        }

        let mut products: HashMap<_, Product> = HashMap::new();
        for lot in lots.values() {
            if !products.contains_key(&lot.product_id) {
                let product = self.catalog.get_product(lot.product_id).await?;
                products.insert(lot.product_id, product);
            }
        }

        let first_lot = &lots[&lines[0].inventory_id];
        let category = products
            .get(&first_lot.product_id)
            .map(|p| p.category.as_str())
            .unwrap_or_default();
        let code = self.codes.generate(&buyer.first_name, category);

        let order = Order::pending(code, buyer.id, actor_id);
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|line| {
                let lot = &lots[&line.inventory_id];
                let unit_price = products
                    .get(&lot.product_id)
                    .map(|p| p.unit_price)
                    .unwrap_or_default();
                OrderItem::new(order.id, lot.id, lot.owner_id, line.quantity, unit_price)
            })
            .collect();

        // Payment later pays out these amounts, so they must be representable.
        order_total(&items)?;
        seller_totals(&items)?;

        tx.insert_order(&order).await?;
        for item in &items {
            tx.insert_order_item(item).await?;
            ledger::decrease(&mut tx, item.inventory_id, item.quantity, actor_id).await?;
        }

        tx.commit().await?;
        Ok(OrderDetails { order, items })
    }

    /// Loads an order with its items.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails, MarketError> {
        let (order, items) = self
            .store
            .get_order_with_items(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Order", order_id))?;
        Ok(OrderDetails { order, items })
    }
}

/// Units requested from each lot, summed over all lines naming it.
fn requested_per_lot(lines: &[LineRequest]) -> Result<BTreeMap<InventoryId, i64>, MarketError> {
    let mut requested = BTreeMap::new();
    for line in lines {
        let total = requested.entry(line.inventory_id).or_insert(0i64);
        *total = total.checked_add(line.quantity).ok_or_else(|| {
            MarketError::InvalidRequest(format!(
                "requested quantity for inventory {} is out of range",
                line.inventory_id
            ))
        })?;
    }
    Ok(requested)
}

fn validate_lines(lines: &[LineRequest]) -> Result<(), MarketError> {
    if lines.is_empty() {
        return Err(MarketError::InvalidRequest(
            "an order needs at least one line".to_string(),
        ));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(MarketError::InvalidRequest(format!(
            "line for inventory {} has non-positive quantity {}",
            line.inventory_id, line.quantity
        )));
    }
    Ok(())
}
