//! Loopback conference call
//!
//! Joins a channel on the in-memory engine, plays two remote participants,
//! toggles local media and screen-share, and prints every event.
//!
//! Run with: cargo run -p rvoip-conference-core --example loopback_call

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rvoip_conference_core::{ConferenceClient, ConferenceEvent, InMemoryEngine, MediaKind, ScreenShareConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loopback_call=info,rvoip_conference_core=info".into()),
        )
        .init();

    let engine = Arc::new(InMemoryEngine::new());
    let client = ConferenceClient::builder()
        .app_id("loopback-demo")
        .screen_share(ScreenShareConfig::hd_720p())
        .engine(engine.clone())
        .build()
        .await?;

    let mut events = client.subscribe_simple();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match &event {
                ConferenceEvent::SurfaceMounted(surface) => println!("  + mount   {}", surface),
                ConferenceEvent::SurfaceUnmounted(surface) => println!("  - unmount {}", surface),
                other => println!("  event     {}", serde_json::to_string(other).unwrap_or_default()),
            }
        }
    });

    client.join("demo-room").await?;
    info!("Joined, playing remote participants");

    engine.emit_published("alice", MediaKind::Audio);
    engine.emit_published("alice", MediaKind::Video);
    engine.emit_published("bob", MediaKind::Video);
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.toggle_audio().await?;
    client.toggle_screen_share().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = client.snapshot();
    info!(surfaces = ?snapshot.surfaces, participants = ?snapshot.participants, "Current layout");

    engine.emit_unpublished("bob", MediaKind::Video);
    client.toggle_screen_share().await?;
    client.leave().await?;

    drop(client);
    tokio::time::sleep(Duration::from_millis(20)).await;
    printer.abort();
    Ok(())
}
