//! Error types for the conference coordinator

use thiserror::Error;

use crate::types::{JoinStage, MediaKind, MembershipState, ParticipantId};

/// Result type for conference operations
pub type ConferenceResult<T> = Result<T, ConferenceError>;

/// Errors surfaced by the session coordinator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConferenceError {
    /// Missing or invalid application configuration, raised before any session exists
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Join sequence failed; the session was rolled back to `Idle`
    #[error("Join failed during {stage}: {reason}")]
    Join { stage: JoinStage, reason: String },

    /// Acquire, toggle or release failed on a single media resource
    #[error("{kind} resource error: {reason}")]
    Resource { kind: MediaKind, reason: String },

    /// Subscribe or unsubscribe failed while reconciling remote media
    #[error("Subscription error for {participant} ({kind}): {reason}")]
    Subscription {
        participant: ParticipantId,
        kind: MediaKind,
        reason: String,
    },

    /// Intent is not valid in the current membership state
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: MembershipState,
    },

    /// Channel identifier rejected
    #[error("Invalid channel: {message}")]
    InvalidChannel { message: String },

    /// The session task is no longer running
    #[error("Conference client has shut down")]
    ShutDown,
}

impl ConferenceError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a join error for the given stage
    pub fn join(stage: JoinStage, reason: impl Into<String>) -> Self {
        Self::Join {
            stage,
            reason: reason.into(),
        }
    }

    /// Create a resource error
    pub fn resource(kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::Resource {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a subscription error
    pub fn subscription(participant: ParticipantId, kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::Subscription {
            participant,
            kind,
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: MembershipState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create an invalid channel error
    pub fn invalid_channel(message: impl Into<String>) -> Self {
        Self::InvalidChannel {
            message: message.into(),
        }
    }

    /// Whether the session survives this error and the user may retry
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ConferenceError::Config { .. } | ConferenceError::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConferenceError::join(JoinStage::Publish, "network down");
        assert_eq!(err.to_string(), "Join failed during publish: network down");

        let err = ConferenceError::invalid_state("toggle audio", MembershipState::Idle);
        assert_eq!(err.to_string(), "Invalid state: cannot toggle audio while Idle");

        let err = ConferenceError::subscription(ParticipantId::from("u7"), MediaKind::Video, "gone");
        assert_eq!(err.to_string(), "Subscription error for u7 (video): gone");
    }

    #[test]
    fn test_recoverability() {
        assert!(!ConferenceError::config("missing app id").is_recoverable());
        assert!(!ConferenceError::ShutDown.is_recoverable());
        assert!(ConferenceError::resource(MediaKind::Audio, "device busy").is_recoverable());
        assert!(ConferenceError::join(JoinStage::JoinChannel, "rejected").is_recoverable());
    }
}
