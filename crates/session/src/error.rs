//! Session error types

use contracts::{CloseReason, ContractError};
use thiserror::Error;

/// Session-specific errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Participant id already present in the session
    #[error("participant '{participant_id}' already joined session '{session_id}'")]
    DuplicateParticipant {
        session_id: String,
        participant_id: String,
    },

    /// Session actor shut down while the request was queued
    #[error("session '{session_id}' closed")]
    SessionClosed { session_id: String },

    /// Contract-level error (validation, resource limits)
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl SessionError {
    pub fn duplicate(session_id: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self::DuplicateParticipant {
            session_id: session_id.into(),
            participant_id: participant_id.into(),
        }
    }

    pub fn closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Close reason reported to a client whose join failed
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::DuplicateParticipant { .. } => CloseReason::Rejected(self.to_string()),
            Self::SessionClosed { .. } => CloseReason::Error(self.to_string()),
            Self::Contract(e) => e.close_reason(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_rejection() {
        let err = SessionError::duplicate("room1", "alice");
        assert_eq!(
            err.close_reason(),
            CloseReason::Rejected("participant 'alice' already joined session 'room1'".into())
        );
    }

    #[test]
    fn test_validation_passthrough() {
        let err: SessionError = ContractError::validation("empty session id").into();
        assert_eq!(
            err.close_reason(),
            CloseReason::Rejected("empty session id".into())
        );
    }
}
