use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row referenced by a write does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A storage-level uniqueness constraint rejected a write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A row or table lock could not be acquired within the lock timeout.
    #[error("Timed out waiting for a lock")]
    LockTimeout,

    /// A quantity or amount would leave the range of its column.
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// The unit of work could not be committed.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// A stored value could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns the violated constraint name, if this is a uniqueness violation.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
