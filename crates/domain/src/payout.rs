//! Seller payouts.

use std::collections::BTreeMap;

use common::{OrderId, PaymentStatus, PayoutId, UserId};
use store::{Order, OrderItem, Payout, Store, UnitOfWork};

use crate::error::MarketError;

/// Sum of `unit_price * quantity` per seller.
pub fn seller_totals(items: &[OrderItem]) -> Result<BTreeMap<UserId, i64>, MarketError> {
    let mut totals = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.seller_id).or_insert(0i64);
        *total = total
            .checked_add(line_total(item)?)
            .ok_or_else(|| amount_overflow(item))?;
    }
    Ok(totals)
}

/// Sum of `unit_price * quantity` over all items.
pub fn order_total(items: &[OrderItem]) -> Result<i64, MarketError> {
    items.iter().try_fold(0i64, |sum, item| {
        sum.checked_add(line_total(item)?)
            .ok_or_else(|| amount_overflow(item))
    })
}

fn line_total(item: &OrderItem) -> Result<i64, MarketError> {
    item.line_total().ok_or_else(|| amount_overflow(item))
}

fn amount_overflow(item: &OrderItem) -> MarketError {
    MarketError::InvalidRequest(format!(
        "amount for {} units at {} from inventory {} is out of range",
        item.quantity, item.unit_price, item.inventory_id
    ))
}

/// Inserts a pending payout for `seller_id` on a paid order, inside the
/// caller's unit of work. `order` must be locked by that unit of work.
pub(crate) async fn insert_payout<T: UnitOfWork>(
    tx: &mut T,
    order: &Order,
    items: &[OrderItem],
    seller_id: UserId,
    amount: i64,
) -> Result<Payout, MarketError> {
    if order.payment_status != PaymentStatus::Paid {
        return Err(MarketError::InvalidTransition(format!(
            "order {} is not paid (payment is {})",
            order.code, order.payment_status
        )));
    }
    if !items.iter().any(|i| i.seller_id == seller_id) {
        return Err(MarketError::not_found(
            "Seller",
            format!("{seller_id} in order {}", order.code),
        ));
    }
    if tx.find_payout(order.id, seller_id).await?.is_some() {
        return Err(MarketError::Conflict(format!(
            "payout for seller {seller_id} on order {} already exists",
            order.code
        )));
    }

    let payout = Payout::pending(order.id, seller_id, amount);
    tx.insert_payout(&payout).await?;
    Ok(payout)
}

/// Creates and settles payouts.
pub struct PayoutScheduler<S> {
    store: S,
}

impl<S: Store> PayoutScheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Schedules a payout of `amount` to `seller_id` for a paid order.
    ///
    /// The amount is taken as given. Fails with `Conflict` if the seller
    /// already has a payout for this order.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_payout(
        &self,
        order_id: OrderId,
        seller_id: UserId,
        amount: i64,
    ) -> Result<Payout, MarketError> {
        if amount < 0 {
            return Err(MarketError::InvalidRequest(format!(
                "payout amount must not be negative, got {amount}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Order", order_id))?;
        let items = tx.order_items(order_id).await?;

        let payout = insert_payout(&mut tx, &order, &items, seller_id, amount).await?;
        tx.commit().await?;

        metrics::counter!("payouts_scheduled_total").increment(1);
        tracing::info!(payout_id = %payout.id, amount, "payout scheduled");
        Ok(payout)
    }

    /// Settles a pending payout as paid or failed.
    #[tracing::instrument(skip(self))]
    pub async fn complete_payout(
        &self,
        payout_id: PayoutId,
        succeeded: bool,
    ) -> Result<Payout, MarketError> {
        let next = if succeeded {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };

        let mut tx = self.store.begin().await?;
        let payout = tx
            .lock_payout(payout_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Payout", payout_id))?;
        if !payout.status.can_transition_to(next) {
            return Err(MarketError::InvalidTransition(format!(
                "payout {payout_id} cannot move from {} to {next}",
                payout.status
            )));
        }

        let payout = tx
            .complete_payout(payout_id, payout.status, next)
            .await?
            .ok_or_else(|| {
                MarketError::InvalidTransition(format!("payout {payout_id} changed concurrently"))
            })?;
        tx.commit().await?;

        tracing::info!(status = %payout.status, "payout completed");
        Ok(payout)
    }

    /// Lists the payouts of an existing order.
    pub async fn list_payouts(&self, order_id: OrderId) -> Result<Vec<Payout>, MarketError> {
        if self.store.get_order(order_id).await?.is_none() {
            return Err(MarketError::not_found("Order", order_id));
        }
        Ok(self.store.list_payouts(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use common::InventoryId;

    use super::*;

    #[test]
    fn totals_group_by_seller() {
        let order = OrderId::new();
        let a = UserId::new();
        let b = UserId::new();
        let items = [
            OrderItem::new(order, InventoryId::new(), a, 1, 300),
            OrderItem::new(order, InventoryId::new(), b, 4, 25),
            OrderItem::new(order, InventoryId::new(), a, 2, 50),
        ];

        let totals = seller_totals(&items).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&a], 400);
        assert_eq!(totals[&b], 100);
        assert_eq!(order_total(&items).unwrap(), 500);
        assert!(seller_totals(&[]).unwrap().is_empty());
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let order = OrderId::new();
        let seller = UserId::new();

        let huge_line = [OrderItem::new(order, InventoryId::new(), seller, 10_i64.pow(16), 1500)];
        assert!(matches!(seller_totals(&huge_line), Err(MarketError::InvalidRequest(_))));
        assert!(matches!(order_total(&huge_line), Err(MarketError::InvalidRequest(_))));

        let huge_sum = [
            OrderItem::new(order, InventoryId::new(), seller, 1, i64::MAX),
            OrderItem::new(order, InventoryId::new(), seller, 1, 1),
        ];
        assert!(matches!(seller_totals(&huge_sum), Err(MarketError::InvalidRequest(_))));
        assert!(matches!(order_total(&huge_sum), Err(MarketError::InvalidRequest(_))));
    }
}
