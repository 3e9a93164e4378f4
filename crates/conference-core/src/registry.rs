//! Remote participant registry
//!
//! Maps each remote participant to the set of media kinds currently
//! subscribed for it. An entry exists exactly while that set is non-empty:
//! the first publication creates it and the last unpublication removes it.
//!
//! The registry is plain data. It performs no engine calls and emits no
//! events; the reconciler turns its outcomes into subscriptions and surface
//! changes.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::types::{MediaKind, ParticipantId, SurfaceId};

/// A remote participant with at least one subscribed media kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    id: ParticipantId,
    kinds: BTreeSet<MediaKind>,
    surface: SurfaceId,
}

impl RemoteParticipant {
    fn new(id: ParticipantId) -> Self {
        let surface = SurfaceId::for_participant(&id);
        Self {
            id,
            kinds: BTreeSet::new(),
            surface,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Currently subscribed kinds
    pub fn kinds(&self) -> &BTreeSet<MediaKind> {
        &self.kinds
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Identity of this participant's rendering tile
    pub fn surface(&self) -> &SurfaceId {
        &self.surface
    }
}

/// Result of applying a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The participant had no entry before this publication
    pub new_participant: bool,
    /// The kind was not subscribed before; `false` means a duplicate
    pub kind_added: bool,
    /// A visual tile must be (re)created for the participant
    pub create_surface: bool,
}

/// Result of applying an unpublication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpublishOutcome {
    /// Participant or kind was not tracked; nothing changed
    Untracked,
    /// The kind's sub-surface stops; the participant keeps other kinds
    KindStopped { remaining: BTreeSet<MediaKind> },
    /// The last kind is gone; the entry was removed and its tile must go
    ParticipantRemoved { surface: SurfaceId },
}

/// Registry of remote participants, in order of first publication
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: IndexMap<ParticipantId, RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `kind` is now subscribed for `participant`
    ///
    /// Adding a kind that is already present changes nothing.
    pub fn on_published(&mut self, participant: &ParticipantId, kind: MediaKind) -> PublishOutcome {
        let new_participant = !self.participants.contains_key(participant);
        let entry = self
            .participants
            .entry(participant.clone())
            .or_insert_with(|| RemoteParticipant::new(participant.clone()));

        let kind_added = entry.kinds.insert(kind);
        PublishOutcome {
            new_participant,
            kind_added,
            create_surface: kind_added && kind.is_visual(),
        }
    }

    /// Record that `kind` is no longer subscribed for `participant`
    pub fn on_unpublished(&mut self, participant: &ParticipantId, kind: MediaKind) -> UnpublishOutcome {
        let Some(entry) = self.participants.get_mut(participant) else {
            return UnpublishOutcome::Untracked;
        };
        if !entry.kinds.remove(&kind) {
            return UnpublishOutcome::Untracked;
        }

        if entry.kinds.is_empty() {
            // shift_remove keeps the display order of the remaining tiles
            let removed = self.participants.shift_remove(participant);
            let surface = removed
                .map(|p| p.surface)
                .unwrap_or_else(|| SurfaceId::for_participant(participant));
            UnpublishOutcome::ParticipantRemoved { surface }
        } else {
            UnpublishOutcome::KindStopped {
                remaining: entry.kinds.clone(),
            }
        }
    }

    pub fn get(&self, participant: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(participant)
    }

    pub fn contains(&self, participant: &ParticipantId, kind: MediaKind) -> bool {
        self.participants
            .get(participant)
            .map(|p| p.has_kind(kind))
            .unwrap_or(false)
    }

    pub fn participants(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.values()
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Drop every entry, returning what was removed
    pub fn clear(&mut self) -> Vec<RemoteParticipant> {
        self.participants.drain(..).map(|(_, p)| p).collect()
    }
}
