//! Order and payment status transitions.

use std::sync::Arc;

use common::{OrderId, OrderStatus, PaymentStatus, UserId};
use store::{Order, OrderItem, Store, UnitOfWork};

use crate::catalog::Actor;
use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::ledger;

/// Checks that `order` may move to `target`.
///
/// Besides the transition table, an order cannot leave `PENDING` for anything
/// but `CANCELLED` until its payment is `PAID`.
pub fn check_transition(order: &Order, target: OrderStatus) -> Result<(), MarketError> {
    if !order.status.can_transition_to(target) {
        return Err(MarketError::InvalidTransition(format!(
            "order {} cannot move from {} to {}",
            order.code, order.status, target
        )));
    }
    if target != OrderStatus::Cancelled && order.payment_status != PaymentStatus::Paid {
        return Err(MarketError::InvalidTransition(format!(
            "order {} cannot move to {} while payment is {}",
            order.code, target, order.payment_status
        )));
    }
    Ok(())
}

/// Checks that a payment result may be recorded for `order`.
pub fn check_payment(order: &Order, next: PaymentStatus) -> Result<(), MarketError> {
    if !order.payment_status.can_transition_to(next) {
        return Err(MarketError::InvalidTransition(format!(
            "payment of order {} cannot move from {} to {}",
            order.code, order.payment_status, next
        )));
    }
    if next == PaymentStatus::Paid && order.status == OrderStatus::Cancelled {
        return Err(MarketError::InvalidTransition(format!(
            "order {} is cancelled and cannot be paid",
            order.code
        )));
    }
    Ok(())
}

/// Locks an order and records a payment result on it, inside the caller's
/// unit of work.
pub(crate) async fn record_payment<T: UnitOfWork>(
    tx: &mut T,
    order_id: OrderId,
    paid: bool,
    actor: UserId,
) -> Result<Order, MarketError> {
    let order = tx
        .lock_order(order_id)
        .await?
        .ok_or_else(|| MarketError::not_found("Order", order_id))?;

    let next = if paid {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Failed
    };
    check_payment(&order, next)?;

    tx.update_payment_status(order_id, order.payment_status, next, actor)
        .await?
        .ok_or_else(|| {
            MarketError::InvalidTransition(format!(
                "payment of order {} changed concurrently",
                order.code
            ))
        })
}

fn is_party(actor: &Actor, order: &Order, items: &[OrderItem], target: OrderStatus) -> bool {
    if actor.is_admin() || items.iter().any(|i| i.seller_id == actor.id) {
        return true;
    }
    target == OrderStatus::Cancelled && order.buyer_id == actor.id
}

/// Drives orders through their status state machine.
pub struct OrderLifecycle<S> {
    store: S,
    config: Arc<MarketConfig>,
}

impl<S: Store> OrderLifecycle<S> {
    pub fn new(store: S, config: Arc<MarketConfig>) -> Self {
        Self { store, config }
    }

    /// Moves an order to `target`.
    ///
    /// The write is conditional on the status read under lock, so of two
    /// concurrent transitions from the same status only one succeeds. A
    /// failed transition leaves the order untouched. Cancelling returns the
    /// items to their lots when `restock_on_cancel` is set.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn transition_order_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, MarketError> {
        actor.require(self.config.roles.for_status(target), "change order status")?;

        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Order", order_id))?;
        let items = tx.order_items(order_id).await?;

        if !is_party(actor, &order, &items, target) {
            return Err(MarketError::Forbidden {
                action: "change the status of this order",
            });
        }
        check_transition(&order, target)?;

        let updated = tx
            .update_order_status(order_id, order.status, target, actor.id)
            .await?
            .ok_or_else(|| {
                MarketError::InvalidTransition(format!(
                    "order {} changed status concurrently",
                    order.code
                ))
            })?;

        if target == OrderStatus::Cancelled && self.config.restock_on_cancel {
            for item in &items {
                ledger::increase(&mut tx, item.inventory_id, item.quantity, actor.id).await?;
            }
        }

        tx.commit().await?;

        metrics::counter!("order_status_transitions_total", "to" => target.as_str()).increment(1);
        tracing::info!(order_id = %order_id, from = %order.status, to = %target, "order status changed");

        Ok(updated)
    }

    /// Records the outcome of a payment for an order.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_result(
        &self,
        order_id: OrderId,
        paid: bool,
    ) -> Result<Order, MarketError> {
        let mut tx = self.store.begin().await?;
        let order = record_payment(&mut tx, order_id, paid, self.config.system_user).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order_id, payment = %order.payment_status, "payment recorded");
        Ok(order)
    }
}
