//! In-memory loopback engine
//!
//! [`InMemoryEngine`] implements [`MediaEngine`] without any transport. It
//! records every call, lets callers inject failures per operation, can delay
//! joins to simulate network latency, and lets a test or demo play the role
//! of remote participants by emitting publication events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{EngineError, EngineResult, JoinRequest, MediaEngine, MediaTrack, ParticipantEventSink, SessionHandle};
use crate::config::ScreenShareConfig;
use crate::types::{MediaKind, ParticipantId};

/// Engine operations that can be made to fail
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum EngineOp {
    Join,
    Leave,
    CreateMicrophone,
    CreateCamera,
    CreateScreenShare,
    Publish,
    Unpublish,
    Subscribe,
    Unsubscribe,
}

impl EngineOp {
    fn name(&self) -> &'static str {
        match self {
            EngineOp::Join => "join",
            EngineOp::Leave => "leave",
            EngineOp::CreateMicrophone => "create_microphone_track",
            EngineOp::CreateCamera => "create_camera_track",
            EngineOp::CreateScreenShare => "create_screen_share_track",
            EngineOp::Publish => "publish",
            EngineOp::Unpublish => "unpublish",
            EngineOp::Subscribe => "subscribe",
            EngineOp::Unsubscribe => "unsubscribe",
        }
    }
}

/// A recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    RegisterEventSink { generation: u64 },
    ClearEventSink,
    Join { channel: String, token: Option<String> },
    Leave { channel: String },
    CreateTrack { kind: MediaKind },
    Publish { track_ids: Vec<String> },
    Unpublish { track_id: String },
    Subscribe { participant: ParticipantId, kind: MediaKind },
    Unsubscribe { participant: ParticipantId, kind: MediaKind },
}

/// Track handed out by [`InMemoryEngine`]
#[derive(Debug)]
pub struct InMemoryTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    fail_toggle: AtomicBool,
    apply_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl InMemoryTrack {
    fn new(id: String, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            fail_toggle: AtomicBool::new(false),
            apply_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of `set_enabled` calls that reached the device
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls, including repeated ones
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `set_enabled` calls fail, as if the device vanished
    pub fn fail_toggles(&self, fail: bool) {
        self.fail_toggle.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaTrack for InMemoryTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn set_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_toggle.load(Ordering::SeqCst) {
            return Err(EngineError::new("set_enabled", format!("{} device unavailable", self.kind)));
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct EngineState {
    sink: Option<ParticipantEventSink>,
    joined: Option<SessionHandle>,
    calls: Vec<EngineCall>,
    fail_once: HashSet<EngineOp>,
    fail_always: HashSet<EngineOp>,
    tracks: Vec<Arc<InMemoryTrack>>,
    published: Vec<String>,
    subscriptions: HashSet<(ParticipantId, MediaKind)>,
    next_track: usize,
}

/// Loopback implementation of [`MediaEngine`]
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    join_delay: Mutex<Option<Duration>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` only
    pub fn fail_next(&self, op: EngineOp) {
        self.state.lock().fail_once.insert(op);
    }

    /// Fail every call of `op` until [`InMemoryEngine::clear_failures`]
    pub fn fail_always(&self, op: EngineOp) {
        self.state.lock().fail_always.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_once.clear();
        state.fail_always.clear();
    }

    /// Suspend every join for `delay` before completing it
    pub fn set_join_delay(&self, delay: Option<Duration>) {
        *self.join_delay.lock() = delay;
    }

    /// Play a remote participant publishing `kind`
    ///
    /// Returns `false` when no live session is listening.
    pub fn emit_published(&self, participant: impl Into<ParticipantId>, kind: MediaKind) -> bool {
        match self.current_sink() {
            Some(sink) => sink.published(participant.into(), kind),
            None => false,
        }
    }

    /// Play a remote participant unpublishing `kind`
    pub fn emit_unpublished(&self, participant: impl Into<ParticipantId>, kind: MediaKind) -> bool {
        match self.current_sink() {
            Some(sink) => sink.unpublished(participant.into(), kind),
            None => false,
        }
    }

    /// Sink registered by the current session, if any
    pub fn current_sink(&self) -> Option<ParticipantEventSink> {
        self.state.lock().sink.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Every track created so far, in creation order
    pub fn tracks(&self) -> Vec<Arc<InMemoryTrack>> {
        self.state.lock().tracks.clone()
    }

    /// Most recently created track of `kind`
    pub fn last_track(&self, kind: MediaKind) -> Option<Arc<InMemoryTrack>> {
        self.state.lock().tracks.iter().rev().find(|t| t.kind == kind).cloned()
    }

    /// Tally of tracks not yet stopped, by kind
    pub fn live_tracks_by_kind(&self) -> HashMap<MediaKind, usize> {
        let mut tally = HashMap::new();
        for track in self.state.lock().tracks.iter().filter(|t| !t.is_stopped()) {
            *tally.entry(track.kind).or_insert(0) += 1;
        }
        tally
    }

    /// Identifiers of tracks currently published
    pub fn published_track_ids(&self) -> Vec<String> {
        self.state.lock().published.clone()
    }

    pub fn is_joined(&self) -> bool {
        self.state.lock().joined.is_some()
    }

    pub fn is_subscribed(&self, participant: &ParticipantId, kind: MediaKind) -> bool {
        self.state.lock().subscriptions.contains(&(participant.clone(), kind))
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }

    fn check(&self, op: EngineOp) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.fail_always.contains(&op) || state.fail_once.remove(&op) {
            debug!(operation = op.name(), "Injected engine failure");
            return Err(EngineError::new(op.name(), "injected failure"));
        }
        Ok(())
    }

    fn create_track(&self, op: EngineOp, kind: MediaKind) -> EngineResult<Arc<dyn MediaTrack>> {
        self.record(EngineCall::CreateTrack { kind });
        self.check(op)?;

        let mut state = self.state.lock();
        state.next_track += 1;
        let track = Arc::new(InMemoryTrack::new(format!("{}-{}", kind, state.next_track), kind));
        state.tracks.push(track.clone());
        Ok(track)
    }
}

#[async_trait]
impl MediaEngine for InMemoryEngine {
    fn register_event_sink(&self, sink: ParticipantEventSink) {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::RegisterEventSink {
            generation: sink.generation(),
        });
        state.sink = Some(sink);
    }

    fn clear_event_sink(&self) {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::ClearEventSink);
        state.sink = None;
    }

    async fn join(&self, request: &JoinRequest) -> EngineResult<SessionHandle> {
        self.record(EngineCall::Join {
            channel: request.channel.clone(),
            token: request.token.clone(),
        });
        let delay = *self.join_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(EngineOp::Join)?;

        let handle = SessionHandle::new(request.channel.clone());
        self.state.lock().joined = Some(handle.clone());
        Ok(handle)
    }

    async fn leave(&self, handle: &SessionHandle) -> EngineResult<()> {
        self.record(EngineCall::Leave {
            channel: handle.channel().to_string(),
        });
        self.check(EngineOp::Leave)?;

        let mut state = self.state.lock();
        if state.joined.as_ref() == Some(handle) {
            state.joined = None;
            state.published.clear();
            state.subscriptions.clear();
        }
        Ok(())
    }

    async fn create_microphone_track(&self) -> EngineResult<Arc<dyn MediaTrack>> {
        self.create_track(EngineOp::CreateMicrophone, MediaKind::Audio)
    }

    async fn create_camera_track(&self) -> EngineResult<Arc<dyn MediaTrack>> {
        self.create_track(EngineOp::CreateCamera, MediaKind::Video)
    }

    async fn create_screen_share_track(&self, config: &ScreenShareConfig) -> EngineResult<Arc<dyn MediaTrack>> {
        debug!(width = config.width, height = config.height, fps = config.frame_rate, "Creating screen track");
        self.create_track(EngineOp::CreateScreenShare, MediaKind::Screen)
    }

    async fn publish(&self, _handle: &SessionHandle, tracks: Vec<Arc<dyn MediaTrack>>) -> EngineResult<()> {
        let track_ids: Vec<String> = tracks.iter().map(|t| t.id().to_string()).collect();
        self.record(EngineCall::Publish {
            track_ids: track_ids.clone(),
        });
        self.check(EngineOp::Publish)?;

        self.state.lock().published.extend(track_ids);
        Ok(())
    }

    async fn unpublish(&self, _handle: &SessionHandle, track: Arc<dyn MediaTrack>) -> EngineResult<()> {
        self.record(EngineCall::Unpublish {
            track_id: track.id().to_string(),
        });
        self.check(EngineOp::Unpublish)?;

        self.state.lock().published.retain(|id| id != track.id());
        Ok(())
    }

    async fn subscribe(&self, _handle: &SessionHandle, participant: &ParticipantId, kind: MediaKind) -> EngineResult<()> {
        self.record(EngineCall::Subscribe {
            participant: participant.clone(),
            kind,
        });
        self.check(EngineOp::Subscribe)?;

        self.state.lock().subscriptions.insert((participant.clone(), kind));
        Ok(())
    }

    async fn unsubscribe(&self, _handle: &SessionHandle, participant: &ParticipantId, kind: MediaKind) -> EngineResult<()> {
        self.record(EngineCall::Unsubscribe {
            participant: participant.clone(),
            kind,
        });
        self.check(EngineOp::Unsubscribe)?;

        self.state.lock().subscriptions.remove(&(participant.clone(), kind));
        Ok(())
    }
}
