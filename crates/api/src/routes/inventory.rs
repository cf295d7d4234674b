//! Stock contribution and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{InventoryId, ProductId, UserId};
use domain::{Catalog, Contribution, Marketplace};
use serde::Deserialize;
use store::{Inventory, Store};

use super::{actor, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ContributeRequest {
    /// Defaults to the acting user.
    pub owner_id: Option<UserId>,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// POST /inventory: add stock, creating the lot on first contribution.
#[tracing::instrument(skip(state, headers, req))]
pub async fn contribute<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    headers: HeaderMap,
    Json(req): Json<ContributeRequest>,
) -> Result<(StatusCode, Json<Contribution>), ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let actor = actor(&state, &headers).await?;
    let owner_id = req.owner_id.unwrap_or(actor.id);

    let contribution = state
        .inventory()
        .contribute_stock(owner_id, req.product_id, req.quantity, &actor)
        .await?;

    let status = if contribution.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(contribution)))
}

/// GET /inventory/:id: load a lot.
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<Marketplace<S, C>>>,
    Path(id): Path<String>,
) -> Result<Json<Inventory>, ApiError>
where
    S: Store + Clone + 'static,
    C: Catalog + Clone + 'static,
{
    let lot_id: InventoryId = parse_id(&id)?;
    Ok(Json(state.inventory().get_inventory(lot_id).await?))
}
