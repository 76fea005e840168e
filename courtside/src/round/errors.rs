//! Round lifecycle error types.

use crate::db::StoreError;
use crate::engine::EngineError;
use thiserror::Error;
use uuid::Uuid;

/// Round controller errors
#[derive(Debug, Error)]
pub enum RoundError {
    /// Referenced tournament, division, round, match or team does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Operation attempted in the wrong lifecycle state
    #[error("Invalid round state: {0}")]
    InvalidState(String),

    /// Required template or strategy data is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported by this operation: {0}")]
    Unsupported(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl RoundError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        RoundError::NotFound { entity, id }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        RoundError::InvalidState(reason.into())
    }

    /// Whether the error is a concurrent modification that a retry may resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, RoundError::Store(StoreError::Conflict(_)))
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            RoundError::Store(StoreError::Conflict(_)) => {
                "The round was changed by someone else, please retry".to_string()
            }
            RoundError::Store(_) => "Internal server error".to_string(),
            RoundError::NotFound { entity, .. } => format!("{entity} not found"),
            _ => self.to_string(),
        }
    }
}

impl From<EngineError> for RoundError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidGroupSize => RoundError::Configuration(err.to_string()),
            EngineError::NotEnoughTeams(_) => RoundError::InvalidState(err.to_string()),
            EngineError::Unsupported(_) => RoundError::Unsupported(err.to_string()),
        }
    }
}

/// Result type for round operations
pub type RoundResult<T> = Result<T, RoundError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::models::MatchStrategy;

    #[test]
    fn test_client_message_hides_store_details() {
        let err = RoundError::Store(StoreError::Timeout(std::time::Duration::from_secs(5)));
        assert_eq!(err.client_message(), "Internal server error");

        let err = RoundError::not_found("Round", Uuid::nil());
        assert_eq!(err.client_message(), "Round not found");
    }

    #[test]
    fn test_engine_errors_map_to_taxonomy() {
        assert!(matches!(
            RoundError::from(EngineError::Unsupported(MatchStrategy::Manual)),
            RoundError::Unsupported(_)
        ));
        assert!(matches!(
            RoundError::from(EngineError::NotEnoughTeams(1)),
            RoundError::InvalidState(_)
        ));
        assert!(RoundError::Store(StoreError::Conflict("x".into())).is_conflict());
    }
}
