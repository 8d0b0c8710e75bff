use bigdecimal::BigDecimal;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("external id '{0}' already exists")]
    DuplicateExternalId(String),

    #[error("{entity} '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientFunds {
        available: BigDecimal,
        requested: BigDecimal,
    },

    /// Another actor holds the payout claim on this withdrawal
    #[error("withdrawal '{0}' is being processed by another request")]
    Locked(String),

    #[cfg(feature = "database")]
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("internal database error: {0}")]
    Internal(String),
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}
