//! Session coordinator
//!
//! [`CallSession`] is the state machine behind the conference client:
//!
//! ```text
//!            join()                 all steps ok
//!   Idle ───────────────► Joining ───────────────► InCall
//!    ▲                       │                        │
//!    │      any step fails   │                        │ leave()
//!    ├───────────────────────┘                        ▼
//!    └────────────────────────────────────────────  Leaving
//!                      release sequence done
//! ```
//!
//! It owns every local media resource and the per-session remote state, and
//! is the only caller of the engine's join/leave/publish/unpublish
//! operations. All mutating operations take `&mut self`, so intents and
//! participant events can never interleave; [`crate::ConferenceClient`]
//! feeds both through a single inbox.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::ConferenceConfig;
use crate::engine::{JoinRequest, MediaEngine, ParticipantEventSink, SessionHandle};
use crate::error::{ConferenceError, ConferenceResult};
use crate::events::{ConferenceEvent, EventBus};
use crate::media::MediaResource;
use crate::reconciler::{EventReconciler, ParticipantEvent, ReconcileOutcome, RemoteState};
use crate::registry::ParticipantRegistry;
use crate::surface::SurfaceSet;
use crate::types::{JoinStage, MediaKind, MembershipState, SessionSnapshot, SurfaceId};

/// One unit of work for the session, in arrival order
#[derive(Debug)]
pub enum SessionInput {
    Join {
        channel: String,
        reply: oneshot::Sender<ConferenceResult<()>>,
    },
    Leave {
        reply: oneshot::Sender<ConferenceResult<()>>,
    },
    ToggleAudio {
        reply: oneshot::Sender<ConferenceResult<bool>>,
    },
    ToggleVideo {
        reply: oneshot::Sender<ConferenceResult<bool>>,
    },
    ToggleScreenShare {
        reply: oneshot::Sender<ConferenceResult<bool>>,
    },
    /// Remote publication change delivered by the engine
    Participant(ParticipantEvent),
}

/// State that exists only while a session is active
struct ActiveSession {
    channel: String,
    handle: Option<SessionHandle>,
    audio: Option<MediaResource>,
    video: Option<MediaResource>,
    screen: Option<MediaResource>,
    registry: ParticipantRegistry,
    surfaces: SurfaceSet,
    joined_at: Option<DateTime<Utc>>,
}

impl ActiveSession {
    fn new(channel: String) -> Self {
        Self {
            channel,
            handle: None,
            audio: None,
            video: None,
            screen: None,
            registry: ParticipantRegistry::new(),
            surfaces: SurfaceSet::new(),
            joined_at: None,
        }
    }

    /// Release every local resource; resources never created are skipped
    fn release_local_media(&mut self) {
        for resource in [self.screen.as_mut(), self.video.as_mut(), self.audio.as_mut()]
            .into_iter()
            .flatten()
        {
            resource.release();
        }
        self.screen = None;
        self.video = None;
        self.audio = None;
    }
}

/// Call-session state machine
pub struct CallSession {
    config: ConferenceConfig,
    engine: Arc<dyn MediaEngine>,
    reconciler: EventReconciler,
    bus: EventBus,
    inbox: mpsc::WeakUnboundedSender<SessionInput>,
    state: MembershipState,
    active: Option<ActiveSession>,
    generation: u64,
}

impl CallSession {
    /// Create an idle session coordinator
    ///
    /// Participant events are queued onto `inbox`; the owner is expected to
    /// feed them back through [`CallSession::handle`].
    pub fn new(
        config: ConferenceConfig,
        engine: Arc<dyn MediaEngine>,
        bus: EventBus,
        inbox: mpsc::WeakUnboundedSender<SessionInput>,
    ) -> ConferenceResult<Self> {
        config.validate()?;
        let reconciler = EventReconciler::new(engine.clone(), bus.clone());
        let session = Self {
            config,
            engine,
            reconciler,
            bus,
            inbox,
            state: MembershipState::Idle,
            active: None,
            generation: 0,
        };
        session.publish_snapshot();
        Ok(session)
    }

    pub fn state(&self) -> MembershipState {
        self.state
    }

    /// Listener generation of the current (or last) session
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &ConferenceConfig {
        &self.config
    }

    /// Remote participants of the active session
    pub fn registry(&self) -> Option<&ParticipantRegistry> {
        self.active.as_ref().map(|a| &a.registry)
    }

    /// Process one inbox item, replying to the issuer if it was an intent
    pub async fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Join { channel, reply } => {
                let result = self.join(&channel).await;
                let _ = reply.send(result);
            }
            SessionInput::Leave { reply } => {
                let result = self.leave().await;
                let _ = reply.send(result);
            }
            SessionInput::ToggleAudio { reply } => {
                let result = self.toggle_audio().await;
                let _ = reply.send(result);
            }
            SessionInput::ToggleVideo { reply } => {
                let result = self.toggle_video().await;
                let _ = reply.send(result);
            }
            SessionInput::ToggleScreenShare { reply } => {
                let result = self.toggle_screen_share().await;
                let _ = reply.send(result);
            }
            SessionInput::Participant(event) => {
                self.handle_participant_event(event).await;
            }
        }
    }

    /// Join `channel`, capture microphone and camera, and publish both
    ///
    /// Any failure releases what was acquired, deregisters the event sink and
    /// returns the session to `Idle` before the error is returned.
    pub async fn join(&mut self, channel: &str) -> ConferenceResult<()> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(ConferenceError::invalid_channel("channel name must not be empty"));
        }
        if self.state != MembershipState::Idle {
            return Err(ConferenceError::invalid_state("join", self.state));
        }

        self.generation += 1;
        self.active = Some(ActiveSession::new(channel.to_string()));
        self.transition(MembershipState::Joining);
        info!(channel, generation = self.generation, "Joining channel");

        self.engine
            .register_event_sink(ParticipantEventSink::new(self.generation, self.inbox.clone()));

        if let Err(err) = self.run_join_steps().await {
            error!(channel, error = %err, "Join failed, rolling back");
            self.rollback_join().await;
            if let ConferenceError::Join { stage, reason } = &err {
                self.bus.emit(ConferenceEvent::JoinFailed {
                    stage: *stage,
                    reason: reason.clone(),
                });
            }
            return Err(err);
        }

        if let Some(active) = self.active.as_mut() {
            active.joined_at = Some(Utc::now());
            active.surfaces.mount_local();
        }
        self.bus.emit(ConferenceEvent::SurfaceMounted(SurfaceId::local()));
        self.transition(MembershipState::InCall);
        info!(channel, "Joined channel");
        Ok(())
    }

    async fn run_join_steps(&mut self) -> ConferenceResult<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| ConferenceError::invalid_state("join", MembershipState::Idle))?;

        let request = JoinRequest {
            app_id: self.config.app_id.clone(),
            channel: active.channel.clone(),
            token: self.config.token.clone(),
        };
        let handle = self
            .engine
            .join(&request)
            .await
            .map_err(|e| ConferenceError::join(JoinStage::JoinChannel, e.to_string()))?;
        active.handle = Some(handle.clone());

        let microphone = self
            .engine
            .create_microphone_track()
            .await
            .map_err(|e| ConferenceError::join(JoinStage::CaptureMicrophone, e.to_string()))?;
        active.audio = Some(MediaResource::new(microphone.clone()));

        let camera = self
            .engine
            .create_camera_track()
            .await
            .map_err(|e| ConferenceError::join(JoinStage::CaptureCamera, e.to_string()))?;
        active.video = Some(MediaResource::new(camera.clone()));

        self.engine
            .publish(&handle, vec![microphone, camera])
            .await
            .map_err(|e| ConferenceError::join(JoinStage::Publish, e.to_string()))?;

        debug!(channel = %active.channel, "Published microphone and camera");
        Ok(())
    }

    async fn rollback_join(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.release_local_media();
            if let Some(handle) = active.handle.take() {
                if let Err(e) = self.engine.leave(&handle).await {
                    warn!(channel = %active.channel, error = %e, "Leave during join rollback failed");
                }
            }
        }
        self.engine.clear_event_sink();
        self.transition(MembershipState::Idle);
    }

    /// Leave the active channel
    ///
    /// Every teardown step is attempted even if an earlier one fails, and the
    /// session always ends up `Idle`. Leaving while already `Idle` succeeds
    /// without doing anything.
    pub async fn leave(&mut self) -> ConferenceResult<()> {
        match self.state {
            MembershipState::Idle => {
                debug!("Leave requested without an active session");
                return Ok(());
            }
            MembershipState::InCall => {}
            state => return Err(ConferenceError::invalid_state("leave", state)),
        }

        self.transition(MembershipState::Leaving);

        if let Some(active) = self.active.as_mut() {
            info!(channel = %active.channel, "Leaving channel");
            active.release_local_media();

            if let Some(handle) = active.handle.take() {
                if let Err(e) = self.engine.leave(&handle).await {
                    warn!(channel = %active.channel, error = %e, "Engine leave failed, continuing teardown");
                    self.bus.emit(ConferenceEvent::Notice {
                        message: format!("Leaving {} did not complete cleanly: {}", active.channel, e),
                    });
                }
            }

            let removed = active.registry.clear();
            debug!(participants = removed.len(), "Cleared participant registry");
            for surface in active.surfaces.clear() {
                self.bus.emit(ConferenceEvent::SurfaceUnmounted(surface));
            }
        }

        self.engine.clear_event_sink();
        self.active = None;
        self.transition(MembershipState::Idle);
        info!("Left channel");
        Ok(())
    }

    /// Flip the microphone enabled flag; returns the new flag
    pub async fn toggle_audio(&mut self) -> ConferenceResult<bool> {
        self.toggle_local(MediaKind::Audio, "toggle audio").await
    }

    /// Flip the camera enabled flag; returns the new flag
    pub async fn toggle_video(&mut self) -> ConferenceResult<bool> {
        self.toggle_local(MediaKind::Video, "toggle video").await
    }

    async fn toggle_local(&mut self, kind: MediaKind, operation: &'static str) -> ConferenceResult<bool> {
        self.require_in_call(operation)?;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| ConferenceError::invalid_state(operation, MembershipState::Idle))?;

        let resource = match kind {
            MediaKind::Audio => active.audio.as_mut(),
            MediaKind::Video => active.video.as_mut(),
            MediaKind::Screen => {
                return Err(ConferenceError::resource(kind, "screen share is started and stopped, not toggled"));
            }
        }
        .ok_or_else(|| ConferenceError::resource(kind, "no local track to toggle"))?;

        let enabled = !resource.is_enabled();
        if let Err(err) = resource.set_enabled(enabled).await {
            warn!(%kind, error = %err, "Toggle failed, keeping previous state");
            self.bus.emit(ConferenceEvent::Notice {
                message: format!("Could not change {}: {}", kind, err),
            });
            return Err(err);
        }

        info!(%kind, enabled, "Local media toggled");
        self.bus.emit(ConferenceEvent::LocalMediaChanged { kind, enabled });
        self.publish_snapshot();
        Ok(enabled)
    }

    /// Start or stop sharing the screen; returns whether sharing is now active
    ///
    /// Screen-share is independent of the camera: both may be published at
    /// once, each with its own surface.
    pub async fn toggle_screen_share(&mut self) -> ConferenceResult<bool> {
        self.require_in_call("toggle screen share")?;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| ConferenceError::invalid_state("toggle screen share", MembershipState::Idle))?;
        let handle = active
            .handle
            .clone()
            .ok_or_else(|| ConferenceError::invalid_state("toggle screen share", MembershipState::Idle))?;

        let sharing = match active.screen.take() {
            None => {
                let track = self
                    .engine
                    .create_screen_share_track(&self.config.screen_share)
                    .await
                    .map_err(|e| ConferenceError::resource(MediaKind::Screen, e.to_string()));
                let mut screen = match track {
                    Ok(track) => MediaResource::new(track),
                    Err(err) => return Err(self.screen_failure(err)),
                };

                if let Err(e) = self.engine.publish(&handle, vec![screen.track()]).await {
                    screen.release();
                    return Err(self.screen_failure(ConferenceError::resource(MediaKind::Screen, e.to_string())));
                }

                active.screen = Some(screen);
                active.surfaces.mount_screen();
                self.bus.emit(ConferenceEvent::SurfaceMounted(SurfaceId::screen_share()));
                true
            }
            Some(mut screen) => {
                if let Err(e) = self.engine.unpublish(&handle, screen.track()).await {
                    active.screen = Some(screen);
                    return Err(self.screen_failure(ConferenceError::resource(MediaKind::Screen, e.to_string())));
                }

                screen.release();
                if active.surfaces.unmount_screen() {
                    self.bus.emit(ConferenceEvent::SurfaceUnmounted(SurfaceId::screen_share()));
                }
                false
            }
        };

        info!(sharing, "Screen share toggled");
        self.bus.emit(ConferenceEvent::LocalMediaChanged {
            kind: MediaKind::Screen,
            enabled: sharing,
        });
        self.publish_snapshot();
        Ok(sharing)
    }

    fn screen_failure(&self, err: ConferenceError) -> ConferenceError {
        warn!(error = %err, "Screen share toggle failed");
        self.bus.emit(ConferenceEvent::Notice {
            message: format!("Screen sharing failed: {}", err),
        });
        err
    }

    /// Apply a remote publication change to the active session
    ///
    /// Events from an earlier session, or arriving outside `InCall`, are
    /// dropped and `None` is returned.
    pub async fn handle_participant_event(&mut self, event: ParticipantEvent) -> Option<ReconcileOutcome> {
        if event.generation != self.generation || self.state != MembershipState::InCall {
            warn!(
                participant = %event.participant,
                kind = %event.kind,
                generation = event.generation,
                current = self.generation,
                state = %self.state,
                "Dropping participant event for inactive session"
            );
            return None;
        }

        let ActiveSession {
            handle,
            registry,
            surfaces,
            ..
        } = self.active.as_mut()?;
        let state = RemoteState {
            handle: handle.as_ref()?,
            registry,
            surfaces,
        };

        let outcome = self.reconciler.apply(state, &event).await;
        self.publish_snapshot();
        Some(outcome)
    }

    /// Leave any active session; used when the owner goes away
    pub async fn shutdown(&mut self) {
        if self.state == MembershipState::InCall {
            let _ = self.leave().await;
        }
    }

    /// Current observable state
    pub fn snapshot(&self) -> SessionSnapshot {
        let Some(active) = self.active.as_ref() else {
            return SessionSnapshot {
                state: self.state,
                ..SessionSnapshot::idle()
            };
        };

        SessionSnapshot {
            state: self.state,
            channel: Some(active.channel.clone()),
            audio_enabled: active.audio.as_ref().map(|r| r.is_enabled()).unwrap_or(false),
            video_enabled: active.video.as_ref().map(|r| r.is_enabled()).unwrap_or(false),
            screen_sharing: active.screen.is_some(),
            surfaces: active.surfaces.ordered(),
            participants: active.registry.ids(),
            joined_at: active.joined_at,
        }
    }

    fn require_in_call(&self, operation: &'static str) -> ConferenceResult<()> {
        if self.state != MembershipState::InCall {
            return Err(ConferenceError::invalid_state(operation, self.state));
        }
        Ok(())
    }

    fn transition(&mut self, next: MembershipState) {
        let previous = std::mem::replace(&mut self.state, next);
        if previous != next {
            debug!(%previous, current = %next, "Membership state changed");
            self.bus.emit(ConferenceEvent::StateChanged {
                previous,
                current: next,
            });
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.bus.publish_snapshot(self.snapshot());
    }
}
