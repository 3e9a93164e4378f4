//! Local media resource handle
//!
//! A [`MediaResource`] wraps one engine track and tracks its enabled flag and
//! release state. The flag only changes after the engine confirms the toggle,
//! and a released resource is never brought back to life.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::MediaTrack;
use crate::error::{ConferenceError, ConferenceResult};
use crate::types::MediaKind;

/// Release state of a media resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Active,
    Released,
}

/// Exclusively owned handle to a local capture stream
#[derive(Debug)]
pub struct MediaResource {
    track: Arc<dyn MediaTrack>,
    kind: MediaKind,
    enabled: bool,
    state: ResourceState,
}

impl MediaResource {
    /// Wrap a freshly created, enabled track
    pub fn new(track: Arc<dyn MediaTrack>) -> Self {
        let kind = track.kind();
        Self {
            track,
            kind,
            enabled: true,
            state: ResourceState::Active,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_released(&self) -> bool {
        self.state == ResourceState::Released
    }

    /// Underlying engine track, used for publish and unpublish
    pub fn track(&self) -> Arc<dyn MediaTrack> {
        self.track.clone()
    }

    /// Apply an enabled flag to the stream
    ///
    /// No-op on a released resource. On engine failure the flag keeps its
    /// previous value and a resource error is returned.
    pub async fn set_enabled(&mut self, enabled: bool) -> ConferenceResult<()> {
        if self.is_released() {
            debug!(kind = %self.kind, "Ignoring set_enabled on released resource");
            return Ok(());
        }

        self.track
            .set_enabled(enabled)
            .await
            .map_err(|e| ConferenceError::resource(self.kind, e.to_string()))?;

        self.enabled = enabled;
        debug!(kind = %self.kind, track = self.track.id(), enabled, "Applied enabled flag");
        Ok(())
    }

    /// Stop the stream; repeated calls are no-ops
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }
        self.track.stop();
        self.state = ResourceState::Released;
        debug!(kind = %self.kind, track = self.track.id(), "Released media resource");
    }
}

impl Drop for MediaResource {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(kind = %self.kind, track = self.track.id(), "Media resource dropped without release");
            self.release();
        }
    }
}
