//! Domain error types.

use store::StoreError;
use thiserror::Error;

use common::InventoryId;

/// Errors returned by the marketplace operations.
///
/// Everything except `Timeout` and `Internal` is an expected business outcome
/// that the caller can correct; none of them is retried automatically.
#[derive(Debug, Error)]
pub enum MarketError {
    /// A referenced entity (buyer, product, lot, order, payout) is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The lot holds fewer units than requested.
    #[error(
        "Insufficient stock in inventory {inventory_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        inventory_id: InventoryId,
        requested: i64,
        available: i64,
    },

    /// A state machine precondition did not hold.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A uniqueness rule rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request itself is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The acting user lacks a required role.
    #[error("Forbidden: not allowed to {action}")]
    Forbidden { action: &'static str },

    /// A lock could not be acquired in time. The caller may retry.
    #[error("Timed out waiting for a lock")]
    Timeout,

    /// Storage failed after validation passed.
    #[error("Internal failure: {0}")]
    Internal(#[source] StoreError),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        MarketError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for failures a retry of the whole unit of work may cure.
    ///
    /// Conflicts qualify because inside a placement they can only come from a
    /// code collision or a concurrent insert of the same row.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::Internal(_) | MarketError::Conflict(_))
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::NotFound { .. } => "not_found",
            MarketError::InsufficientStock { .. } => "insufficient_stock",
            MarketError::InvalidTransition(_) => "invalid_transition",
            MarketError::Conflict(_) => "conflict",
            MarketError::InvalidRequest(_) => "invalid_request",
            MarketError::Forbidden { .. } => "forbidden",
            MarketError::Timeout => "timeout",
            MarketError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for MarketError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { constraint } => {
                MarketError::Conflict(format!("unique constraint {constraint} violated"))
            }
            StoreError::LockTimeout => MarketError::Timeout,
            StoreError::OutOfRange(detail) => MarketError::InvalidRequest(detail),
            other => MarketError::Internal(other),
        }
    }
}
