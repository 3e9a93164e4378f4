//! Media engine capability
//!
//! The coordinator never touches transport, encoding or devices directly. It
//! drives an implementation of [`MediaEngine`] and holds the local tracks the
//! engine hands out as [`MediaTrack`] objects.
//!
//! Remote publications flow back through a [`ParticipantEventSink`] that the
//! coordinator registers for the lifetime of one session. Each sink is stamped
//! with the session's listener generation so events that outlive their session
//! can be recognised and dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ScreenShareConfig;
use crate::reconciler::{ParticipantEvent, PublicationChange};
use crate::session::SessionInput;
use crate::types::{MediaKind, ParticipantId};

#[cfg(feature = "mock-engine")]
pub mod memory;

#[cfg(feature = "mock-engine")]
pub use memory::{EngineCall, EngineOp, InMemoryEngine, InMemoryTrack};

/// Result type for engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by the media engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct EngineError {
    /// Engine operation that failed
    pub operation: String,
    /// Engine supplied description
    pub message: String,
}

impl EngineError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Handle to a joined channel, issued by the engine
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    id: Uuid,
    channel: String,
}

impl SessionHandle {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.channel)
    }
}

/// Parameters of a channel join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub app_id: String,
    pub channel: String,
    pub token: Option<String>,
}

/// A capture or playback stream owned by the engine
#[async_trait]
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Engine-assigned track identifier
    fn id(&self) -> &str;

    /// Kind of media carried by this track
    fn kind(&self) -> MediaKind;

    /// Enable or disable the stream without releasing it
    async fn set_enabled(&self, enabled: bool) -> EngineResult<()>;

    /// Stop the stream and free its device
    fn stop(&self);
}

/// Abstract media-session engine consumed by the coordinator
///
/// Only the coordinator calls `join`, `leave`, `publish` and `unpublish`.
/// `subscribe` and `unsubscribe` are issued by the event reconciler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Route remote publication events of the upcoming session to `sink`
    fn register_event_sink(&self, sink: ParticipantEventSink);

    /// Stop routing remote publication events
    fn clear_event_sink(&self);

    /// Join a channel
    async fn join(&self, request: &JoinRequest) -> EngineResult<SessionHandle>;

    /// Leave a channel; leaving an already-left session succeeds
    async fn leave(&self, handle: &SessionHandle) -> EngineResult<()>;

    async fn create_microphone_track(&self) -> EngineResult<Arc<dyn MediaTrack>>;

    async fn create_camera_track(&self) -> EngineResult<Arc<dyn MediaTrack>>;

    async fn create_screen_share_track(&self, config: &ScreenShareConfig) -> EngineResult<Arc<dyn MediaTrack>>;

    /// Make local tracks available to the channel
    async fn publish(&self, handle: &SessionHandle, tracks: Vec<Arc<dyn MediaTrack>>) -> EngineResult<()>;

    /// Withdraw a local track from the channel
    async fn unpublish(&self, handle: &SessionHandle, track: Arc<dyn MediaTrack>) -> EngineResult<()>;

    /// Start receiving one kind of media from a remote participant
    async fn subscribe(&self, handle: &SessionHandle, participant: &ParticipantId, kind: MediaKind) -> EngineResult<()>;

    /// Stop receiving one kind of media from a remote participant
    async fn unsubscribe(&self, handle: &SessionHandle, participant: &ParticipantId, kind: MediaKind) -> EngineResult<()>;
}

/// Callback surface the engine uses to report remote publications
///
/// Events are queued onto the owning session's inbox and applied there in
/// delivery order. The sink does not keep the session alive.
#[derive(Clone)]
pub struct ParticipantEventSink {
    generation: u64,
    inbox: mpsc::WeakUnboundedSender<SessionInput>,
}

impl ParticipantEventSink {
    pub(crate) fn new(generation: u64, inbox: mpsc::WeakUnboundedSender<SessionInput>) -> Self {
        Self { generation, inbox }
    }

    /// Listener generation of the session this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that `participant` published `kind`
    ///
    /// Returns `false` when the owning session no longer exists.
    pub fn published(&self, participant: ParticipantId, kind: MediaKind) -> bool {
        self.deliver(participant, kind, PublicationChange::Published)
    }

    /// Report that `participant` unpublished `kind`
    pub fn unpublished(&self, participant: ParticipantId, kind: MediaKind) -> bool {
        self.deliver(participant, kind, PublicationChange::Unpublished)
    }

    fn deliver(&self, participant: ParticipantId, kind: MediaKind, change: PublicationChange) -> bool {
        let Some(inbox) = self.inbox.upgrade() else {
            return false;
        };
        let event = ParticipantEvent {
            generation: self.generation,
            participant,
            kind,
            change,
        };
        inbox.send(SessionInput::Participant(event)).is_ok()
    }
}

impl fmt::Debug for ParticipantEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantEventSink")
            .field("generation", &self.generation)
            .finish()
    }
}
