//! HTTP handlers.

pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payouts;

use std::str::FromStr;

use axum::http::HeaderMap;
use common::UserId;
use domain::{Actor, Catalog, MarketError, Marketplace};
use store::Store;

use crate::error::ApiError;

/// Header naming the user on whose behalf a request runs.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Resolves the acting user from the request headers.
pub(crate) async fn actor<S, C>(
    market: &Marketplace<S, C>,
    headers: &HeaderMap,
) -> Result<Actor, ApiError>
where
    S: Store + Clone,
    C: Catalog + Clone,
{
    let raw = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_HEADER} header")))?;
    let user_id: UserId = parse_id(raw)?;

    match market.actor(user_id).await {
        Ok(actor) => Ok(actor),
        Err(MarketError::NotFound { .. }) => {
            Err(ApiError::Unauthorized(format!("unknown actor {user_id}")))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
