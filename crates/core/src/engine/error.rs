use thiserror::Error;

use crate::roster::RosterError;
use crate::ticket::StoreError;

/// Errors surfaced by lifecycle engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Ticket not found: {0}")]
    NotFound(i64),

    #[error("Actor {actor} is not allowed to {action}")]
    Unauthorized { actor: i64, action: String },

    #[error("Ticket {ticket_id} in status '{status}' does not permit {action}")]
    InvalidTransition {
        ticket_id: i64,
        status: String,
        action: String,
    },

    /// Another decision already settled this level; the caller's verdict was
    /// not recorded.
    #[error("Level {level} of ticket {ticket_id} has already been decided")]
    AlreadyDecided { ticket_id: i64, level: u32 },

    /// The ticket state moved between read and write; re-read and retry.
    #[error("Ticket {0} was modified concurrently")]
    StaleState(i64),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Conflict { ticket_id, .. } => EngineError::StaleState(ticket_id),
            StoreError::DuplicateDecision { ticket_id, level } => {
                EngineError::AlreadyDecided { ticket_id, level }
            }
            StoreError::Database(msg) => EngineError::Persistence(msg),
        }
    }
}

impl From<RosterError> for EngineError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::Database(msg) => EngineError::Persistence(msg),
        }
    }
}
