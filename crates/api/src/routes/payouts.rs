//! Payout scheduling and settlement endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{OrderId, PayoutId, UserId};
use domain::{Catalog, Marketplace};
use serde::Deserialize;
use store::{Payout, Store};

use super::{actor, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub order_id: OrderId,
    pub seller_id: UserId,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub succeeded: bool,
}

/// POST /payouts: schedule a payout for one seller of a paid order.
#[tracing::instrument(skip(state, headers, req))]
pub async fn schedule<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    headers: HeaderMap,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<Payout>), ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let actor = actor(&state, &headers).await?;
    actor.require(&state.config().roles.settle_payouts, "schedule payouts")?;

    let payout = state
        .payouts()
        .schedule_payout(req.order_id, req.seller_id, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

/// POST /payouts/:id/complete: settle a payout as paid or failed.
#[tracing::instrument(skip(state, headers, req))]
pub async fn complete<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Payout>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let payout_id: PayoutId = parse_id(&id)?;
    let actor = actor(&state, &headers).await?;
    actor.require(&state.config().roles.settle_payouts, "settle payouts")?;

    let payout = state
        .payouts()
        .complete_payout(payout_id, req.succeeded)
        .await?;
    Ok(Json(payout))
}
