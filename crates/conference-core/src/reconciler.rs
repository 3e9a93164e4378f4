//! Event reconciler
//!
//! Applies remote publish/unpublish notifications to the participant registry
//! and the surface set. Publications are only recorded after the engine
//! subscription succeeds; unpublications always clean up local state, even
//! when the engine refuses the unsubscribe.
//!
//! A failure on one participant's event is logged and dropped here so that
//! processing of other participants' events continues.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{MediaEngine, SessionHandle};
use crate::error::ConferenceError;
use crate::events::{ConferenceEvent, EventBus};
use crate::registry::{ParticipantRegistry, PublishOutcome, UnpublishOutcome};
use crate::surface::SurfaceSet;
use crate::types::{MediaKind, ParticipantId, SurfaceId};

/// Direction of a remote publication change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationChange {
    Published,
    Unpublished,
}

/// Remote publication notification delivered by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEvent {
    /// Listener generation of the session the event was delivered to
    pub generation: u64,
    pub participant: ParticipantId,
    pub kind: MediaKind,
    pub change: PublicationChange,
}

/// What reconciling one event did
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Subscription succeeded and the registry was updated
    Subscribed(PublishOutcome),
    /// The kind was already subscribed; nothing was done
    Duplicate,
    /// The event was dropped without touching the registry
    Dropped(ConferenceError),
    /// Local state was cleaned up; the engine unsubscribe may have failed
    Unpublished {
        outcome: UnpublishOutcome,
        unsubscribe_error: Option<ConferenceError>,
    },
}

/// Remote state of the active session that the reconciler mutates
pub struct RemoteState<'a> {
    pub handle: &'a SessionHandle,
    pub registry: &'a mut ParticipantRegistry,
    pub surfaces: &'a mut SurfaceSet,
}

/// Applies participant events to session state
pub struct EventReconciler {
    engine: Arc<dyn MediaEngine>,
    bus: EventBus,
}

impl EventReconciler {
    pub fn new(engine: Arc<dyn MediaEngine>, bus: EventBus) -> Self {
        Self { engine, bus }
    }

    /// Apply one participant event
    pub async fn apply(&self, state: RemoteState<'_>, event: &ParticipantEvent) -> ReconcileOutcome {
        match event.change {
            PublicationChange::Published => self.on_published(state, &event.participant, event.kind).await,
            PublicationChange::Unpublished => self.on_unpublished(state, &event.participant, event.kind).await,
        }
    }

    async fn on_published(&self, state: RemoteState<'_>, participant: &ParticipantId, kind: MediaKind) -> ReconcileOutcome {
        if state.registry.contains(participant, kind) {
            debug!(%participant, %kind, "Duplicate publication ignored");
            return ReconcileOutcome::Duplicate;
        }

        if let Err(e) = self.engine.subscribe(state.handle, participant, kind).await {
            let err = ConferenceError::subscription(participant.clone(), kind, e.to_string());
            warn!(%participant, %kind, error = %err, "Dropping publication, subscribe failed");
            return ReconcileOutcome::Dropped(err);
        }

        let outcome = state.registry.on_published(participant, kind);
        debug!(
            %participant,
            %kind,
            new_participant = outcome.new_participant,
            create_surface = outcome.create_surface,
            "Subscribed to remote media"
        );

        self.bus.emit(ConferenceEvent::RemoteMediaStarted {
            participant: participant.clone(),
            kind,
        });

        if outcome.create_surface {
            let surface = SurfaceId::for_participant(participant);
            if !state.surfaces.mount_remote(surface.clone()) {
                debug!(%surface, "Re-creating existing remote tile");
            }
            self.bus.emit(ConferenceEvent::SurfaceMounted(surface));
        }

        ReconcileOutcome::Subscribed(outcome)
    }

    async fn on_unpublished(&self, state: RemoteState<'_>, participant: &ParticipantId, kind: MediaKind) -> ReconcileOutcome {
        let mut unsubscribe_error = None;
        if state.registry.contains(participant, kind) {
            if let Err(e) = self.engine.unsubscribe(state.handle, participant, kind).await {
                let err = ConferenceError::subscription(participant.clone(), kind, e.to_string());
                warn!(%participant, %kind, error = %err, "Unsubscribe failed, cleaning up anyway");
                unsubscribe_error = Some(err);
            }
        }

        let outcome = state.registry.on_unpublished(participant, kind);
        match &outcome {
            UnpublishOutcome::Untracked => {
                debug!(%participant, %kind, "Unpublication for untracked media ignored");
            }
            UnpublishOutcome::KindStopped { remaining } => {
                debug!(%participant, %kind, remaining = remaining.len(), "Remote media stopped");
                self.bus.emit(ConferenceEvent::RemoteMediaStopped {
                    participant: participant.clone(),
                    kind,
                });
            }
            UnpublishOutcome::ParticipantRemoved { surface } => {
                debug!(%participant, %kind, "Last remote media stopped, removing participant");
                self.bus.emit(ConferenceEvent::RemoteMediaStopped {
                    participant: participant.clone(),
                    kind,
                });
                if state.surfaces.unmount_remote(surface) {
                    self.bus.emit(ConferenceEvent::SurfaceUnmounted(surface.clone()));
                }
                self.bus.emit(ConferenceEvent::ParticipantLeft(participant.clone()));
            }
        }

        ReconcileOutcome::Unpublished {
            outcome,
            unsubscribe_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, MockMediaEngine};
    use tokio::sync::broadcast::error::TryRecvError;
    use tracing_test::traced_test;

    struct Fixture {
        handle: SessionHandle,
        registry: ParticipantRegistry,
        surfaces: SurfaceSet,
        bus: EventBus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                handle: SessionHandle::new("room1"),
                registry: ParticipantRegistry::new(),
                surfaces: SurfaceSet::new(),
                bus: EventBus::new(32),
            }
        }

        fn state(&mut self) -> RemoteState<'_> {
            RemoteState {
                handle: &self.handle,
                registry: &mut self.registry,
                surfaces: &mut self.surfaces,
            }
        }
    }

    fn event(participant: &str, kind: MediaKind, change: PublicationChange) -> ParticipantEvent {
        ParticipantEvent {
            generation: 1,
            participant: ParticipantId::from(participant),
            kind,
            change,
        }
    }

    fn tile(participant: &str) -> SurfaceId {
        SurfaceId::for_participant(&ParticipantId::from(participant))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ConferenceEvent>) -> Vec<ConferenceEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    #[tokio::test]
    async fn test_published_video_mounts_tile_once() {
        let mut mock = MockMediaEngine::new();
        mock.expect_subscribe().times(1).returning(|_, _, _| Ok(()));

        let mut fx = Fixture::new();
        let mut rx = fx.bus.receiver();
        let reconciler = EventReconciler::new(Arc::new(mock), fx.bus.clone());

        let published = event("u1", MediaKind::Video, PublicationChange::Published);
        let first = reconciler.apply(fx.state(), &published).await;
        let second = reconciler.apply(fx.state(), &published).await;

        assert!(matches!(first, ReconcileOutcome::Subscribed(PublishOutcome { create_surface: true, .. })));
        assert_eq!(second, ReconcileOutcome::Duplicate);

        let mounted: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ConferenceEvent::SurfaceMounted(_)))
            .collect();
        assert_eq!(mounted, vec![ConferenceEvent::SurfaceMounted(tile("u1"))]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_subscribe_failure_leaves_registry_untouched() {
        let mut mock = MockMediaEngine::new();
        mock.expect_subscribe()
            .times(1)
            .returning(|_, _, _| Err(EngineError::new("subscribe", "stream gone")));

        let mut fx = Fixture::new();
        let reconciler = EventReconciler::new(Arc::new(mock), fx.bus.clone());

        let outcome = reconciler
            .apply(fx.state(), &event("u1", MediaKind::Video, PublicationChange::Published))
            .await;

        assert!(matches!(outcome, ReconcileOutcome::Dropped(ConferenceError::Subscription { .. })));
        assert!(fx.registry.is_empty());
        assert!(fx.surfaces.is_empty());
        assert!(logs_contain("subscribe failed"));
    }

    #[tokio::test]
    async fn test_failed_subscribe_does_not_block_other_participants() {
        let mut mock = MockMediaEngine::new();
        mock.expect_subscribe().returning(|_, participant, _| {
            if participant.as_str() == "bad" {
                Err(EngineError::new("subscribe", "refused"))
            } else {
                Ok(())
            }
        });

        let mut fx = Fixture::new();
        let reconciler = EventReconciler::new(Arc::new(mock), fx.bus.clone());

        reconciler
            .apply(fx.state(), &event("bad", MediaKind::Video, PublicationChange::Published))
            .await;
        reconciler
            .apply(fx.state(), &event("good", MediaKind::Video, PublicationChange::Published))
            .await;

        assert_eq!(fx.registry.ids(), vec![ParticipantId::from("good")]);
        assert_eq!(fx.surfaces.ordered(), vec![tile("good")]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unsubscribe_failure_still_cleans_up() {
        let mut mock = MockMediaEngine::new();
        mock.expect_subscribe().returning(|_, _, _| Ok(()));
        mock.expect_unsubscribe()
            .times(1)
            .returning(|_, _, _| Err(EngineError::new("unsubscribe", "timeout")));

        let mut fx = Fixture::new();
        let mut rx = fx.bus.receiver();
        let reconciler = EventReconciler::new(Arc::new(mock), fx.bus.clone());

        reconciler
            .apply(fx.state(), &event("u1", MediaKind::Video, PublicationChange::Published))
            .await;
        let outcome = reconciler
            .apply(fx.state(), &event("u1", MediaKind::Video, PublicationChange::Unpublished))
            .await;

        match outcome {
            ReconcileOutcome::Unpublished {
                outcome: UnpublishOutcome::ParticipantRemoved { surface },
                unsubscribe_error: Some(ConferenceError::Subscription { .. }),
            } => assert_eq!(surface.as_str(), "user-u1"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(fx.registry.is_empty());
        assert!(fx.surfaces.is_empty());

        let events = drain(&mut rx);
        assert!(events.contains(&ConferenceEvent::SurfaceUnmounted(tile("u1"))));
        assert!(events.contains(&ConferenceEvent::ParticipantLeft(ParticipantId::from("u1"))));
        assert!(logs_contain("Unsubscribe failed"));
    }

    #[tokio::test]
    async fn test_untracked_unpublish_skips_engine() {
        let mut mock = MockMediaEngine::new();
        mock.expect_unsubscribe().times(0);

        let mut fx = Fixture::new();
        let reconciler = EventReconciler::new(Arc::new(mock), fx.bus.clone());

        let outcome = reconciler
            .apply(fx.state(), &event("nobody", MediaKind::Audio, PublicationChange::Unpublished))
            .await;

        assert_eq!(
            outcome,
            ReconcileOutcome::Unpublished {
                outcome: UnpublishOutcome::Untracked,
                unsubscribe_error: None,
            }
        );
    }
}
