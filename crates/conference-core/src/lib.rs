//! # Conference Core - Call-Session Coordinator
//!
//! This crate coordinates one user's participation in a multi-party
//! audio/video channel. It drives a pluggable [`MediaEngine`] through the
//! join, publish, toggle and leave sequences, reconciles remote publication
//! events into a registry of participants, and exposes the result as events
//! and snapshots a presentation layer can render.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_conference_core::{ConferenceClient, InMemoryEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ConferenceClient::builder()
//!         .app_id("demo-app")
//!         .engine(Arc::new(InMemoryEngine::new()))
//!         .build()
//!         .await?;
//!
//!     client.join("room1").await?;
//!     client.toggle_audio().await?;
//!     client.leave().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  ConferenceClient ──intents──┐
//!                              ▼
//!                     ┌─────────────────┐   join/publish/leave   ┌─────────────┐
//!                     │   CallSession   │ ─────────────────────► │ MediaEngine │
//!  ParticipantEvent ─►│  (single inbox) │ ◄───── participant ─── │             │
//!                     └────────┬────────┘        events          └─────────────┘
//!                              │
//!            MediaResource ×3  │  EventReconciler ─► ParticipantRegistry
//!                              ▼                 ─► SurfaceSet
//!                          EventBus ─► ConferenceEvent / SessionSnapshot
//! ```
//!
//! ## Features
//!
//! - `mock-engine` (default): in-memory loopback [`InMemoryEngine`] for tests,
//!   demos and UI work without a media service

pub mod builder;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod media;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod surface;
pub mod types;

// Re-export main types
pub use builder::ConferenceClientBuilder;
pub use client::ConferenceClient;
pub use config::{ConferenceConfig, ContentHint, ScreenShareConfig};
pub use engine::{
    EngineError, EngineResult, JoinRequest, MediaEngine, MediaTrack, ParticipantEventSink, SessionHandle,
};
pub use error::{ConferenceError, ConferenceResult};
pub use events::{ConferenceEvent, EventBus, EventIterator, EventStream};
pub use media::{MediaResource, ResourceState};
pub use reconciler::{EventReconciler, ParticipantEvent, PublicationChange, ReconcileOutcome};
pub use registry::{ParticipantRegistry, PublishOutcome, RemoteParticipant, UnpublishOutcome};
pub use session::{CallSession, SessionInput};
pub use surface::SurfaceSet;
pub use types::{JoinStage, MediaKind, MembershipState, ParticipantId, SessionSnapshot, SurfaceId};

#[cfg(feature = "mock-engine")]
pub use engine::{EngineCall, EngineOp, InMemoryEngine, InMemoryTrack};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
