//! Conference configuration and presets
//!
//! The application identifier and the optional access token are startup
//! inputs: a configuration without an application identifier is rejected
//! before any session can be created.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │    ConferenceConfig      │
//! │ ┌──────────────────────┐ │
//! │ │   Credentials        │ │  • application id (required)
//! │ │   ScreenShareConfig ─┼─┼─ • encoder resolution / frame rate
//! │ │   Event settings     │ │  • broadcast capacity
//! │ └──────────────────────┘ │
//! └──────────────────────────┘
//! ```
//!
//! # Usage Examples
//!
//! ```rust
//! use rvoip_conference_core::config::{ConferenceConfig, ScreenShareConfig};
//!
//! let config = ConferenceConfig::new("my-app-id")
//!     .with_token("temporary-token")
//!     .with_screen_share(ScreenShareConfig::full_hd_1080p());
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.screen_share.height, 1080);
//! ```
//!
//! ## Loading from the environment
//!
//! ```rust,no_run
//! use rvoip_conference_core::config::ConferenceConfig;
//!
//! // Reads RVOIP_CONFERENCE_APP_ID and RVOIP_CONFERENCE_TOKEN
//! let config = ConferenceConfig::from_env().expect("app id must be configured");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConferenceError, ConferenceResult};

/// Environment variable holding the application identifier
pub const APP_ID_ENV: &str = "RVOIP_CONFERENCE_APP_ID";

/// Environment variable holding the optional access token
pub const TOKEN_ENV: &str = "RVOIP_CONFERENCE_TOKEN";

/// Default capacity of the conference event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Hint to the encoder about what the shared screen mostly contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentHint {
    /// Text and still images: favour sharpness
    Detail,
    /// Video playback and animation: favour smoothness
    Motion,
}

/// Encoder settings for the local screen-share track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenShareConfig {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Capture frame rate
    pub frame_rate: u32,
    /// Target bitrate, engine default when unset
    pub bitrate_kbps: Option<u32>,
    /// Encoder content hint
    pub content_hint: ContentHint,
}

impl ScreenShareConfig {
    /// 1280x720 at 15 fps
    pub fn hd_720p() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 15,
            bitrate_kbps: Some(1130),
            content_hint: ContentHint::Detail,
        }
    }

    /// 1920x1080 at 15 fps
    pub fn full_hd_1080p() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 15,
            bitrate_kbps: Some(2080),
            content_hint: ContentHint::Detail,
        }
    }

    fn validate(&self) -> ConferenceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConferenceError::config(format!(
                "screen-share resolution {}x{} is invalid",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(ConferenceError::config("screen-share frame rate must be positive"));
        }
        Ok(())
    }
}

impl Default for ScreenShareConfig {
    fn default() -> Self {
        Self::full_hd_1080p()
    }
}

/// Configuration for a conference client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceConfig {
    /// Application identifier issued by the media service
    pub app_id: String,
    /// Access token; channels without token authentication accept `None`
    #[serde(default)]
    pub token: Option<String>,
    /// Encoder settings used when screen-share is started
    #[serde(default)]
    pub screen_share: ScreenShareConfig,
    /// Capacity of the conference event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl ConferenceConfig {
    /// Create a configuration for the given application identifier
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            token: None,
            screen_share: ScreenShareConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Load credentials from `RVOIP_CONFERENCE_APP_ID` / `RVOIP_CONFERENCE_TOKEN`
    pub fn from_env() -> ConferenceResult<Self> {
        let app_id = std::env::var(APP_ID_ENV)
            .map_err(|_| ConferenceError::config(format!("{} is not set", APP_ID_ENV)))?;
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());

        let config = Self {
            token,
            ..Self::new(app_id)
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> ConferenceResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConferenceError::config(format!("invalid configuration document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_screen_share(mut self, screen_share: ScreenShareConfig) -> Self {
        self.screen_share = screen_share;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check the configuration can be used to join channels
    pub fn validate(&self) -> ConferenceResult<()> {
        if self.app_id.trim().is_empty() {
            return Err(ConferenceError::config("application identifier is required"));
        }
        if self.event_capacity == 0 {
            return Err(ConferenceError::config("event capacity must be positive"));
        }
        self.screen_share.validate()
    }
}
