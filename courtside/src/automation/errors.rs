//! Automation pipeline error types.

use crate::db::StoreError;
use crate::round::RoundError;
use thiserror::Error;
use uuid::Uuid;

/// Automation errors
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// The event does not apply to the match in its current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The queue has been shut down and accepts no more events
    #[error("Event queue is closed")]
    QueueClosed,
}

impl AutomationError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        AutomationError::InvalidState(reason.into())
    }

    /// Whether the error is a concurrent modification that a retry may resolve
    pub fn is_conflict(&self) -> bool {
        match self {
            AutomationError::Store(StoreError::Conflict(_)) => true,
            AutomationError::Round(err) => err.is_conflict(),
            _ => false,
        }
    }
}

/// Result type for automation operations
pub type AutomationResult<T> = Result<T, AutomationError>;
