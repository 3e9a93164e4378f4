//! Core types for conference-core
//!
//! Identifiers, media kinds, membership states and the snapshot the
//! presentation layer renders from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
    /// Screen-share video
    Screen,
}

impl MediaKind {
    /// Whether this kind is rendered into a visual tile
    pub fn is_visual(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Screen)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Screen => "screen",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity of a remote participant, stable while it stays in the channel
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u32> for ParticipantId {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

/// Identity of a logical rendering surface
///
/// Surface identities are derived from role or participant identity so the
/// rendering layer can key its widgets on them across updates.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    /// Surface for the local camera preview
    pub fn local() -> Self {
        Self("local-user".to_string())
    }

    /// Surface for the local screen-share preview
    pub fn screen_share() -> Self {
        Self("screen-share".to_string())
    }

    /// Tile for a remote participant
    pub fn for_participant(participant: &ParticipantId) -> Self {
        Self(format!("user-{}", participant))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Membership state of the local participant
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MembershipState {
    /// Not in a channel (also the state after leaving)
    Idle,
    /// Join sequence in flight
    Joining,
    /// Joined and publishing
    InCall,
    /// Teardown sequence in flight
    Leaving,
}

impl MembershipState {
    /// Whether a session object exists in this state
    pub fn has_session(&self) -> bool {
        !matches!(self, MembershipState::Idle)
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MembershipState::Idle => "Idle",
            MembershipState::Joining => "Joining",
            MembershipState::InCall => "InCall",
            MembershipState::Leaving => "Leaving",
        };
        f.write_str(name)
    }
}

/// Step of the join sequence, reported when a join fails
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum JoinStage {
    JoinChannel,
    CaptureMicrophone,
    CaptureCamera,
    Publish,
}

impl fmt::Display for JoinStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinStage::JoinChannel => "channel join",
            JoinStage::CaptureMicrophone => "microphone capture",
            JoinStage::CaptureCamera => "camera capture",
            JoinStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current membership state
    pub state: MembershipState,
    /// Channel of the active session, if any
    pub channel: Option<String>,
    /// Whether local microphone audio is enabled
    pub audio_enabled: bool,
    /// Whether local camera video is enabled
    pub video_enabled: bool,
    /// Whether a local screen-share is being published
    pub screen_sharing: bool,
    /// Rendering surfaces to mount, in display order
    pub surfaces: Vec<SurfaceId>,
    /// Remote participants with at least one subscribed kind
    pub participants: Vec<ParticipantId>,
    /// When the session reached `InCall`
    pub joined_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Snapshot of a client with no session
    pub fn idle() -> Self {
        Self {
            state: MembershipState::Idle,
            channel: None,
            audio_enabled: false,
            video_enabled: false,
            screen_sharing: false,
            surfaces: Vec::new(),
            participants: Vec::new(),
            joined_at: None,
        }
    }

    pub fn is_in_call(&self) -> bool {
        self.state == MembershipState::InCall
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_identities() {
        assert_eq!(SurfaceId::local().as_str(), "local-user");
        assert_eq!(SurfaceId::screen_share().as_str(), "screen-share");
        assert_eq!(SurfaceId::for_participant(&ParticipantId::from("u1")).as_str(), "user-u1");
        assert_eq!(SurfaceId::for_participant(&ParticipantId::from(4242u32)).as_str(), "user-4242");
    }

    #[test]
    fn test_media_kind_visual() {
        assert!(!MediaKind::Audio.is_visual());
        assert!(MediaKind::Video.is_visual());
        assert!(MediaKind::Screen.is_visual());
        assert_eq!(serde_json::to_string(&MediaKind::Screen).unwrap(), "\"screen\"");
    }

    #[test]
    fn test_idle_snapshot() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, MembershipState::Idle);
        assert!(!snapshot.state.has_session());
        assert!(snapshot.surfaces.is_empty());
        assert!(!snapshot.is_in_call());
    }
}
