//! Ledger storage errors.
//!
//! Request-scoped callers propagate these; the sweep logs and skips them.
//! A lost compare-and-set race is NOT an error (see
//! `ReservationRepository::transition`); these cover genuinely failed
//! storage work.

use thiserror::Error;

/// Errors from the reservation ledger and variant storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// "reservation" or "variant"
        entity: String,
        id: String,
    },

    /// Insert of a reservation id the ledger already holds. Ledger rows are
    /// insert-once, so this means a replayed create.
    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: String, id: String },

    /// A stored value could not be decoded into its domain type
    /// (e.g. an unknown status string).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),

    /// Could not reach the database at all.
    #[error("connection error: {0}")]
    Connection(String),

    /// Domain validation surfaced while materializing a row.
    #[error("domain error: {0}")]
    Domain(#[from] stockroom_domain::DomainError),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as SqlxError;

        match err {
            // 23505 = unique_violation; the only unique keys are the two
            // primary keys, so name the constraint as the id
            SqlxError::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Duplicate {
                    entity: "row".to_string(),
                    id: db_err
                        .constraint()
                        .unwrap_or("unique constraint")
                        .to_string(),
                }
            }
            SqlxError::Database(db_err) => StoreError::Database(db_err.to_string()),
            e @ (SqlxError::ColumnDecode { .. } | SqlxError::Decode(_)) => {
                StoreError::Serialization(e.to_string())
            }
            e @ (SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_)) => {
                StoreError::Connection(e.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
