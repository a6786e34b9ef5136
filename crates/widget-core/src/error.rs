//! Storage Error Types

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a storage gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested record does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violated (e.g. duplicate user email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced record is missing (e.g. order pointing at an unknown transaction)
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Storage engine did not answer in time
    #[error("Storage timed out")]
    Timeout,

    /// Engine-level failure
    #[error("Storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("order", 42);
        assert_eq!(err.to_string(), "order 42 not found");
        assert!(err.is_not_found());
    }
}
