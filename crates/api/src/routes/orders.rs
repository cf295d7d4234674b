//! Order placement, status and payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{OrderId, OrderStatus, UserId};
use domain::{
    Catalog, LineRequest, MarketError, Marketplace, OrderDetails, PaymentOutcome, PaymentSignal,
};
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, Payout, Store};

use super::{actor, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    /// Defaults to the acting user.
    pub buyer_id: Option<UserId>,
    pub lines: Vec<LineRequest>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub paid: bool,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub total: i64,
}

impl TryFrom<OrderDetails> for OrderResponse {
    type Error = MarketError;

    fn try_from(details: OrderDetails) -> Result<Self, Self::Error> {
        let total = details.total()?;
        Ok(Self {
            order: details.order,
            items: details.items,
            total,
        })
    }
}

// -- Handlers --

/// POST /orders: place an order.
#[tracing::instrument(skip(state, headers, req))]
pub async fn place<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let actor = actor(&state, &headers).await?;
    let buyer_id = req.buyer_id.unwrap_or(actor.id);

    let details = state
        .orders()
        .place_order(buyer_id, &req.lines, &actor)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::try_from(details)?)))
}

/// GET /orders/:id: load an order with its items.
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let order_id: OrderId = parse_id(&id)?;
    let details = state.orders().get_order(order_id).await?;
    Ok(Json(OrderResponse::try_from(details)?))
}

/// POST /orders/:id/status: move an order to a new status.
#[tracing::instrument(skip(state, headers, req))]
pub async fn transition<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Order>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let order_id: OrderId = parse_id(&id)?;
    let actor = actor(&state, &headers).await?;

    let order = state
        .lifecycle()
        .transition_order_status(order_id, req.status, &actor)
        .await?;
    Ok(Json(order))
}

/// POST /orders/:id/payment: apply a payment confirmation.
#[tracing::instrument(skip(state, headers, req))]
pub async fn payment<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<PaymentOutcome>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let order_id: OrderId = parse_id(&id)?;
    let actor = actor(&state, &headers).await?;
    actor.require(&state.config().roles.settle_payouts, "record payments")?;

    let outcome = state
        .apply_payment_signal(PaymentSignal {
            order_id,
            paid: req.paid,
        })
        .await?;
    Ok(Json(outcome))
}

/// GET /orders/:id/payouts: list the payouts of an order.
#[tracing::instrument(skip(state))]
pub async fn payouts<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Payout>>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let order_id: OrderId = parse_id(&id)?;
    let payouts = state.payouts().list_payouts(order_id).await?;
    Ok(Json(payouts))
}
