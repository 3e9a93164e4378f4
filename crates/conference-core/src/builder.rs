//! Builder pattern for creating conference clients

use std::sync::Arc;

use crate::client::ConferenceClient;
use crate::config::{ConferenceConfig, ScreenShareConfig};
use crate::engine::MediaEngine;
use crate::error::{ConferenceError, ConferenceResult};

/// Builder for creating a conference client with custom configuration
pub struct ConferenceClientBuilder {
    config: ConferenceConfig,
    engine: Option<Arc<dyn MediaEngine>>,
}

impl ConferenceClientBuilder {
    /// Create a new builder; an app id and an engine are required
    pub fn new() -> Self {
        Self {
            config: ConferenceConfig::new(""),
            engine: None,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: ConferenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the application id (required)
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.app_id = app_id.into();
        self
    }

    /// Set the channel join token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Configure screen-share capture
    pub fn screen_share(mut self, screen_share: ScreenShareConfig) -> Self {
        self.config.screen_share = screen_share;
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Set the media engine (required)
    pub fn engine(mut self, engine: Arc<dyn MediaEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build the client and start its session task
    pub async fn build(self) -> ConferenceResult<ConferenceClient> {
        self.config.validate()?;
        let engine = self
            .engine
            .ok_or_else(|| ConferenceError::config("A media engine is required"))?;
        ConferenceClient::spawn(self.config, engine)
    }

    /// Get the configuration without building
    pub fn into_config(self) -> ConferenceResult<ConferenceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConferenceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
