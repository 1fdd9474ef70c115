// errors.rs
use thiserror::Error;

/// Errors surfaced by the engine. Business failures carry enough detail for
/// the caller to render feedback; storage anomalies abort the unit of work.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error(
        "insufficient capacity for {technician_id} on {date} \
         (need {needed_minutes} min, only {available_minutes} min available, shortage: {short_minutes} min)"
    )]
    CapacityExceeded {
        technician_id: String,
        date: String,
        needed_minutes: i64,
        available_minutes: i64,
        short_minutes: i64,
    },

    #[error("no calendar entry for {technician_id} on {date}")]
    EntryNotFound { technician_id: String, date: String },

    #[error("change {0} cannot be rolled back")]
    NotRollbackable(i64),

    #[error("calendar entry for {technician_id} on {date} vanished during update")]
    LostUpdate { technician_id: String, date: String },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// True for failures that are a normal business outcome rather than a
    /// storage or consistency anomaly.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::InvalidInput { .. }
                | EngineError::CapacityExceeded { .. }
                | EngineError::NotRollbackable(_)
        )
    }
}
