//! Tournament event stream.
//!
//! Observers (dashboards, clients, push relays) consume an explicit event
//! stream rather than polling mutable rows. Delivery is fire-and-forget:
//! a notifier failure is logged and never affects tournament correctness.

use crate::tournament::models::{ParticipantId, RoundId, TournamentId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle events emitted by the tournament core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TournamentEvent {
    TournamentStarted {
        tournament_id: TournamentId,
    },
    RoundOpened {
        tournament_id: TournamentId,
        round_id: RoundId,
        round_number: u32,
    },
    ParticipantEliminated {
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        round_number: u32,
    },
    TournamentFinished {
        tournament_id: TournamentId,
        winner: ParticipantId,
    },
}

/// Notification sink for tournament events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish an event. Must never fail from the caller's perspective.
    async fn publish(&self, event: TournamentEvent);
}

/// Notifier backed by a tokio broadcast channel
pub struct BroadcastNotifier {
    sender: broadcast::Sender<TournamentEvent>,
}

impl BroadcastNotifier {
    /// Create a notifier with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a notifier with an explicit channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<TournamentEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: TournamentEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("no event subscribers, dropping notification");
        }
    }
}

/// Notifier that discards every event
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn publish(&self, _event: TournamentEvent) {}
}
