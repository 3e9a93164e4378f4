//! Event system for the conference client
//!
//! Two channels feed the presentation layer:
//!
//! - a `broadcast` channel of [`ConferenceEvent`]s describing every change
//!   (state transitions, surfaces to mount/unmount, notices), and
//! - a `watch` channel holding the latest [`SessionSnapshot`], for renderers
//!   that only care about the current state.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{JoinStage, MediaKind, MembershipState, ParticipantId, SessionSnapshot, SurfaceId};

/// Events emitted by the conference client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConferenceEvent {
    /// Membership state changed
    StateChanged {
        previous: MembershipState,
        current: MembershipState,
    },

    /// A rendering surface must be (re)created
    SurfaceMounted(SurfaceId),

    /// A rendering surface must be torn down
    SurfaceUnmounted(SurfaceId),

    /// Subscribed remote media started flowing
    RemoteMediaStarted {
        participant: ParticipantId,
        kind: MediaKind,
    },

    /// A remote media kind stopped; the participant's tile is kept
    RemoteMediaStopped {
        participant: ParticipantId,
        kind: MediaKind,
    },

    /// The participant's last media kind was unpublished
    ParticipantLeft(ParticipantId),

    /// Local microphone, camera or screen-share changed
    LocalMediaChanged { kind: MediaKind, enabled: bool },

    /// Join was rolled back; the client is back at the pre-call screen
    JoinFailed { stage: JoinStage, reason: String },

    /// Transient, user-visible notice
    Notice { message: String },
}

/// Event stream type
pub type EventStream = BroadcastStream<ConferenceEvent>;

/// Simple event iterator that doesn't require StreamExt
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Get the next event, skipping over lag notifications
    pub async fn next(&mut self) -> Option<ConferenceEvent> {
        use tokio_stream::StreamExt;
        loop {
            match self.stream.next().await {
                Some(Ok(event)) => return Some(event),
                Some(Err(_lagged)) => continue,
                None => return None,
            }
        }
    }
}

/// Outbound side of the event system, owned by the session
#[derive(Clone)]
pub struct EventBus {
    events: broadcast::Sender<ConferenceEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (snapshot, _) = watch::channel(SessionSnapshot::idle());
        Self { events, snapshot }
    }

    /// Emit an event
    pub fn emit(&self, event: ConferenceEvent) {
        // Ignore send errors (no receivers)
        let _ = self.events.send(event);
    }

    /// Replace the published snapshot
    pub fn publish_snapshot(&self, snapshot: SessionSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    /// Subscribe to events as a stream
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Subscribe to events with a simple iterator
    pub fn subscribe_simple(&self) -> EventIterator {
        EventIterator::new(self.subscribe())
    }

    /// Raw receiver, for callers using `try_recv`
    pub fn receiver(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn receiver_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
