//! # Knockout Arena
//!
//! A multiplayer knockout competition engine: a roster of participants
//! (human and bot stand-ins) plays repeated timed rounds against a shared
//! mystery target, and at designated checkpoints the lowest-scoring
//! participants are removed until one survivor takes the pot.
//!
//! This library owns the tournament lifecycle state machine and the
//! elimination-scoring engine. Target selection, gameplay recording, the
//! stake ledger, and notification delivery are external collaborators
//! reached through narrow trait seams.
//!
//! ## Architecture
//!
//! - **Invite & Join**: accept/decline negotiation with stake debits and a
//!   centralized join-deadline sweep
//! - **Round Scheduler**: opens timed rounds against drawn targets and
//!   owns the single-winner conditional close
//! - **Scoring Adapters**: human scores from the gameplay recorder, bot
//!   scores derived from the human field of the same round
//! - **Elimination Engine**: block accumulators per participant, with the
//!   lowest block removed at each checkpoint
//! - **Tournament Manager**: composes the above and drives
//!   `lobby -> live -> finished`, each edge traversed at most once
//!
//! Every lifecycle transition is a conditional update, so concurrent
//! workers race safely: one wins, the rest observe a benign no-op.
//!
//! ## Core Modules
//!
//! - [`tournament`]: lifecycle management, models, and errors
//! - [`elimination`]: accumulator bookkeeping and checkpoint removals
//! - [`store`]: storage backends (PostgreSQL and in-memory)
//! - [`events`]: the observer-facing event stream

pub mod config;
pub mod db;
pub mod elimination;
pub mod events;
pub mod invite;
pub mod ledger;
pub mod retry;
pub mod rounds;
pub mod scoring;
pub mod store;
pub mod sweeper;
pub mod tournament;

pub use config::{TargetCriteria, TournamentConfig};
pub use events::{BroadcastNotifier, Notifier, NullNotifier, TournamentEvent};
pub use store::{MemoryStore, PgStore, TournamentStore};
pub use sweeper::Sweeper;
pub use tournament::{
    CloseOutcome, Invitee, StartOutcome, SubmitOutcome, TournamentError, TournamentManager,
    TournamentResult,
    models::{Participant, Round, RoundEntry, Tournament, TournamentStatus},
};
