//! Conference client handle
//!
//! [`ConferenceClient`] is a cheap, cloneable handle to a session task. The
//! task owns the [`CallSession`] and drains a single inbox that carries both
//! user intents and engine participant events, so a `leave` issued while a
//! `join` is in flight is processed after the join completes or rolls back.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::builder::ConferenceClientBuilder;
use crate::config::ConferenceConfig;
use crate::engine::MediaEngine;
use crate::error::{ConferenceError, ConferenceResult};
use crate::events::{ConferenceEvent, EventBus, EventIterator, EventStream};
use crate::session::{CallSession, SessionInput};
use crate::types::SessionSnapshot;

/// Handle to a running conference session
///
/// Dropping the last handle stops the session task, which leaves any active
/// channel before exiting.
#[derive(Clone)]
pub struct ConferenceClient {
    inbox: mpsc::UnboundedSender<SessionInput>,
    bus: EventBus,
}

impl ConferenceClient {
    /// Create a builder
    pub fn builder() -> ConferenceClientBuilder {
        ConferenceClientBuilder::new()
    }

    /// Spawn the session task. Must be called within a Tokio runtime.
    pub(crate) fn spawn(config: ConferenceConfig, engine: Arc<dyn MediaEngine>) -> ConferenceResult<Self> {
        let bus = EventBus::new(config.event_capacity);
        let (inbox, rx) = mpsc::unbounded_channel();
        let session = CallSession::new(config, engine, bus.clone(), inbox.downgrade())?;

        tokio::spawn(run_session(session, rx));
        Ok(Self { inbox, bus })
    }

    /// Join `channel` and start publishing microphone and camera
    pub async fn join(&self, channel: impl Into<String>) -> ConferenceResult<()> {
        let channel = channel.into();
        self.request(|reply| SessionInput::Join { channel, reply }).await
    }

    /// Leave the current channel; succeeds immediately when idle
    pub async fn leave(&self) -> ConferenceResult<()> {
        self.request(|reply| SessionInput::Leave { reply }).await
    }

    /// Flip the microphone; returns whether it is now enabled
    pub async fn toggle_audio(&self) -> ConferenceResult<bool> {
        self.request(|reply| SessionInput::ToggleAudio { reply }).await
    }

    /// Flip the camera; returns whether it is now enabled
    pub async fn toggle_video(&self) -> ConferenceResult<bool> {
        self.request(|reply| SessionInput::ToggleVideo { reply }).await
    }

    /// Start or stop screen sharing; returns whether sharing is now active
    pub async fn toggle_screen_share(&self) -> ConferenceResult<bool> {
        self.request(|reply| SessionInput::ToggleScreenShare { reply }).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.bus.snapshot()
    }

    /// Watch the published state
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.bus.watch_snapshot()
    }

    /// Subscribe to events as a stream
    pub fn events(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Subscribe to events without needing `StreamExt`
    pub fn subscribe_simple(&self) -> EventIterator {
        self.bus.subscribe_simple()
    }

    /// Raw broadcast receiver
    pub fn event_receiver(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.bus.receiver()
    }

    /// Whether the session task is still running
    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<ConferenceResult<T>>) -> SessionInput,
    ) -> ConferenceResult<T> {
        let (reply, response) = oneshot::channel();
        self.inbox.send(make(reply)).map_err(|_| ConferenceError::ShutDown)?;
        response.await.map_err(|_| ConferenceError::ShutDown)?
    }
}

impl std::fmt::Debug for ConferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConferenceClient")
            .field("state", &self.bus.snapshot().state)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_session(mut session: CallSession, mut inbox: mpsc::UnboundedReceiver<SessionInput>) {
    info!(app_id = %session.config().app_id, "Conference session task started");

    while let Some(input) = inbox.recv().await {
        session.handle(input).await;
    }

    debug!("All client handles dropped, shutting down session");
    session.shutdown().await;
    info!("Conference session task stopped");
}
