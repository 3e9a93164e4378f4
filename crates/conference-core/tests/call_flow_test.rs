//! End-to-end call flows through `ConferenceClient` on the loopback engine

use std::sync::Arc;
use std::time::Duration;

use rvoip_conference_core::{
    ConferenceClient, ConferenceError, ConferenceEvent, EngineCall, EngineOp, InMemoryEngine, JoinStage, MediaKind,
    MediaTrack, MembershipState, ParticipantId, SessionSnapshot, SurfaceId,
};
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_conference_core=debug")
        .with_test_writer()
        .try_init();
}

async fn setup() -> (ConferenceClient, Arc<InMemoryEngine>) {
    init_tracing();
    let engine = Arc::new(InMemoryEngine::new());
    let client = ConferenceClient::builder()
        .app_id("test-app")
        .token("test-token")
        .engine(engine.clone())
        .build()
        .await
        .expect("client should build");
    (client, engine)
}

/// Wait until the published snapshot satisfies `predicate`
async fn wait_until(client: &ConferenceClient, predicate: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
    let mut watch = client.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), watch.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session task stopped")
        .clone();
    snapshot
}

fn drain(rx: &mut broadcast::Receiver<ConferenceEvent>) -> Vec<ConferenceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn tile(id: &str) -> SurfaceId {
    SurfaceId::for_participant(&ParticipantId::from(id))
}

#[tokio::test]
async fn test_join_publishes_local_media() {
    let (client, engine) = setup().await;
    let mut rx = client.event_receiver();

    assert_ok!(client.join("room1").await);

    let snapshot = client.snapshot();
    assert_eq!(snapshot.state, MembershipState::InCall);
    assert_eq!(snapshot.channel.as_deref(), Some("room1"));
    assert!(snapshot.audio_enabled && snapshot.video_enabled);
    assert!(snapshot.participants.is_empty());

    let tracks = engine.live_tracks_by_kind();
    assert_eq!(tracks.get(&MediaKind::Audio), Some(&1));
    assert_eq!(tracks.get(&MediaKind::Video), Some(&1));
    assert_eq!(
        engine.count_calls(|c| matches!(c, EngineCall::Join { token: Some(t), .. } if t == "test-token")),
        1
    );

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        ConferenceEvent::StateChanged {
            previous: MembershipState::Idle,
            current: MembershipState::Joining,
        }
    );
    assert!(events.contains(&ConferenceEvent::SurfaceMounted(SurfaceId::local())));
    assert_eq!(
        events.last(),
        Some(&ConferenceEvent::StateChanged {
            previous: MembershipState::Joining,
            current: MembershipState::InCall,
        })
    );
}

#[tokio::test]
async fn test_remote_audio_then_video_mounts_one_tile() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    let mut rx = client.event_receiver();

    assert!(engine.emit_published("u1", MediaKind::Audio));
    assert!(engine.emit_published("u1", MediaKind::Video));
    let snapshot = wait_until(&client, |s| s.surfaces.contains(&tile("u1"))).await;

    assert_eq!(snapshot.participants, vec![ParticipantId::from("u1")]);
    assert!(engine.is_subscribed(&ParticipantId::from("u1"), MediaKind::Audio));
    assert!(engine.is_subscribed(&ParticipantId::from("u1"), MediaKind::Video));

    let mounts = drain(&mut rx)
        .into_iter()
        .filter(|e| *e == ConferenceEvent::SurfaceMounted(tile("u1")))
        .count();
    assert_eq!(mounts, 1);
}

#[tokio::test]
async fn test_remote_unpublish_video_then_audio() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    engine.emit_published("u1", MediaKind::Audio);
    engine.emit_published("u1", MediaKind::Video);
    wait_until(&client, |s| s.surfaces.contains(&tile("u1"))).await;
    let mut rx = client.event_receiver();

    engine.emit_unpublished("u1", MediaKind::Video);
    engine.emit_unpublished("u1", MediaKind::Audio);
    let snapshot = wait_until(&client, |s| s.participants.is_empty()).await;

    assert_eq!(snapshot.surfaces, vec![SurfaceId::local()]);
    assert!(!engine.is_subscribed(&ParticipantId::from("u1"), MediaKind::Audio));

    let events = drain(&mut rx);
    let left_at = events
        .iter()
        .position(|e| *e == ConferenceEvent::ParticipantLeft(ParticipantId::from("u1")))
        .expect("participant should leave");
    let video_stopped_at = events
        .iter()
        .position(|e| {
            *e == ConferenceEvent::RemoteMediaStopped {
                participant: ParticipantId::from("u1"),
                kind: MediaKind::Video,
            }
        })
        .expect("video should stop");
    assert!(video_stopped_at < left_at);
}

#[tokio::test]
async fn test_republish_after_unpublish_remounts_tile() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    engine.emit_published("u1", MediaKind::Video);
    wait_until(&client, |s| s.surfaces.contains(&tile("u1"))).await;
    let mut rx = client.event_receiver();

    engine.emit_unpublished("u1", MediaKind::Video);
    engine.emit_published("u1", MediaKind::Video);
    // Events share one queue, so the marker is applied after both
    engine.emit_published("marker", MediaKind::Audio);
    let snapshot = wait_until(&client, |s| s.participants.contains(&ParticipantId::from("marker"))).await;

    assert_eq!(snapshot.surfaces, vec![SurfaceId::local(), tile("u1")]);
    assert!(engine.is_subscribed(&ParticipantId::from("u1"), MediaKind::Video));
    assert_eq!(
        engine.count_calls(|c| matches!(c, EngineCall::Subscribe { participant, .. } if participant.as_str() == "u1")),
        2
    );

    let u1_events: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| match e {
            ConferenceEvent::RemoteMediaStarted { participant, .. }
            | ConferenceEvent::RemoteMediaStopped { participant, .. } => participant.as_str() == "u1",
            ConferenceEvent::SurfaceMounted(surface) | ConferenceEvent::SurfaceUnmounted(surface) => {
                *surface == tile("u1")
            }
            ConferenceEvent::ParticipantLeft(participant) => participant.as_str() == "u1",
            _ => false,
        })
        .collect();
    assert_eq!(
        u1_events,
        vec![
            ConferenceEvent::RemoteMediaStopped {
                participant: ParticipantId::from("u1"),
                kind: MediaKind::Video,
            },
            ConferenceEvent::SurfaceUnmounted(tile("u1")),
            ConferenceEvent::ParticipantLeft(ParticipantId::from("u1")),
            ConferenceEvent::RemoteMediaStarted {
                participant: ParticipantId::from("u1"),
                kind: MediaKind::Video,
            },
            ConferenceEvent::SurfaceMounted(tile("u1")),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_publication_subscribes_once() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();

    engine.emit_published("u2", MediaKind::Video);
    engine.emit_published("u2", MediaKind::Video);
    engine.emit_published("u3", MediaKind::Audio);
    let snapshot = wait_until(&client, |s| s.participants.len() == 2).await;

    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::Subscribe { .. })), 2);
    // Audio-only participants have no visual tile
    assert_eq!(snapshot.surfaces, vec![SurfaceId::local(), tile("u2")]);
}

#[tokio::test]
async fn test_subscribe_failure_drops_only_that_event() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();

    engine.fail_next(EngineOp::Subscribe);
    engine.emit_published("u1", MediaKind::Video);
    engine.emit_published("u2", MediaKind::Video);
    let snapshot = wait_until(&client, |s| !s.participants.is_empty()).await;

    assert_eq!(snapshot.participants, vec![ParticipantId::from("u2")]);
    assert_eq!(client.snapshot().state, MembershipState::InCall);
}

#[tokio::test]
async fn test_screen_share_twice() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();

    assert!(assert_ok!(client.toggle_screen_share().await));
    let snapshot = client.snapshot();
    assert!(snapshot.screen_sharing);
    assert_eq!(snapshot.surfaces, vec![SurfaceId::local(), SurfaceId::screen_share()]);

    assert!(!assert_ok!(client.toggle_screen_share().await));
    let snapshot = client.snapshot();
    assert!(!snapshot.screen_sharing);
    assert!(snapshot.video_enabled);

    let screen = engine.last_track(MediaKind::Screen).unwrap();
    assert!(screen.is_stopped());
    assert!(!engine.published_track_ids().contains(&screen.id().to_string()));
    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::Unpublish { .. })), 1);
}

#[tokio::test]
async fn test_leave_twice_is_idempotent() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    engine.emit_published("u1", MediaKind::Video);
    wait_until(&client, |s| !s.participants.is_empty()).await;

    assert_ok!(client.leave().await);
    assert_ok!(client.leave().await);

    assert_eq!(client.snapshot(), SessionSnapshot::idle());
    assert!(!engine.is_joined());
    assert!(engine.tracks().iter().all(|t| t.stop_calls() == 1));
    assert_eq!(engine.count_calls(|c| matches!(c, EngineCall::Leave { .. })), 1);
}

#[tokio::test]
async fn test_publish_failure_rolls_back() {
    let (client, engine) = setup().await;
    let mut rx = client.event_receiver();
    engine.fail_next(EngineOp::Publish);

    let err = assert_err!(client.join("room1").await);
    assert!(matches!(err, ConferenceError::Join { stage: JoinStage::Publish, .. }));

    assert_eq!(client.snapshot(), SessionSnapshot::idle());
    assert!(engine.tracks().iter().all(|t| t.is_stopped()));
    assert!(!engine.is_joined());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ConferenceEvent::JoinFailed { stage: JoinStage::Publish, .. })));

    // Events from the failed attempt no longer reach the session
    assert!(!engine.emit_published("late", MediaKind::Video));
}

#[tokio::test]
async fn test_audio_off_then_on() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    let microphone = engine.last_track(MediaKind::Audio).unwrap();

    assert!(!client.toggle_audio().await.unwrap());
    assert!(client.toggle_audio().await.unwrap());

    assert!(client.snapshot().audio_enabled);
    assert!(microphone.is_enabled());
    assert_eq!(microphone.apply_calls(), 2);
}

#[tokio::test]
async fn test_toggle_failure_keeps_state() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    let mut rx = client.event_receiver();
    engine.last_track(MediaKind::Video).unwrap().fail_toggles(true);

    let err = client.toggle_video().await.unwrap_err();
    assert!(matches!(err, ConferenceError::Resource { kind: MediaKind::Video, .. }));
    assert!(err.is_recoverable());
    assert!(client.snapshot().video_enabled);
    assert!(drain(&mut rx).iter().any(|e| matches!(e, ConferenceEvent::Notice { .. })));
}

#[tokio::test]
async fn test_intents_rejected_when_idle() {
    let (client, _engine) = setup().await;

    assert_eq!(
        client.toggle_audio().await.unwrap_err(),
        ConferenceError::InvalidState {
            operation: "toggle audio",
            state: MembershipState::Idle,
        }
    );
    assert!(matches!(
        client.join("").await.unwrap_err(),
        ConferenceError::InvalidChannel { .. }
    ));
}

#[tokio::test]
async fn test_leave_during_join_waits_for_join() {
    let (client, engine) = setup().await;
    engine.set_join_delay(Some(Duration::from_millis(50)));

    let leaver = client.clone();
    let (joined, left) = futures::join!(client.join("room1"), async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        leaver.leave().await
    });

    assert_ok!(joined);
    assert_ok!(left);
    assert_eq!(client.snapshot().state, MembershipState::Idle);
    assert!(!engine.is_joined());
    assert!(engine.tracks().iter().all(|t| t.is_stopped()));

    let calls = engine.calls();
    let leave_at = calls.iter().position(|c| matches!(c, EngineCall::Leave { .. })).unwrap();
    let publish_at = calls.iter().position(|c| matches!(c, EngineCall::Publish { .. })).unwrap();
    assert!(publish_at < leave_at);
}

#[tokio::test]
async fn test_rejoin_drops_events_from_previous_session() {
    let (client, engine) = setup().await;
    client.join("room1").await.unwrap();
    let stale = engine.current_sink().unwrap();
    client.leave().await.unwrap();
    client.join("room2").await.unwrap();

    assert!(stale.published(ParticipantId::from("ghost"), MediaKind::Video));
    engine.emit_published("u1", MediaKind::Video);
    let snapshot = wait_until(&client, |s| !s.participants.is_empty()).await;

    assert_eq!(snapshot.channel.as_deref(), Some("room2"));
    assert_eq!(snapshot.participants, vec![ParticipantId::from("u1")]);
    assert!(!engine.is_subscribed(&ParticipantId::from("ghost"), MediaKind::Video));
}

#[tokio::test]
async fn test_toggles_during_join_run_after_join() {
    let (client, engine) = setup().await;
    engine.set_join_delay(Some(Duration::from_millis(50)));

    let toggler = client.clone();
    let (joined, toggles) = futures::join!(client.join("room1"), async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let audio = toggler.toggle_audio().await;
        let screen = toggler.toggle_screen_share().await;
        (audio, screen)
    });

    assert_ok!(joined);
    assert_eq!(toggles.0, Ok(false));
    assert_eq!(toggles.1, Ok(true));

    let snapshot = client.snapshot();
    assert_eq!(snapshot.state, MembershipState::InCall);
    assert!(!snapshot.audio_enabled);
    assert!(snapshot.screen_sharing);
    assert_eq!(engine.last_track(MediaKind::Audio).unwrap().apply_calls(), 1);

    let calls = engine.calls();
    let first_publish = calls.iter().position(|c| matches!(c, EngineCall::Publish { .. })).unwrap();
    let screen_created = calls
        .iter()
        .position(|c| matches!(c, EngineCall::CreateTrack { kind: MediaKind::Screen }))
        .unwrap();
    assert!(first_publish < screen_created);
}
