//! Storage abstraction for tournament state.
//!
//! The trait encodes the single-writer rules of the engine as conditional
//! operations: status transitions and round closes succeed for exactly one
//! caller, duplicate round entries are rejected by construction, and an
//! elimination resolution is applied atomically. Both backends honor the
//! same contract, so callers never rely on convention for race safety.

use crate::config::TournamentConfig;
use crate::tournament::models::{
    AccountId, InviteStatus, Participant, ParticipantId, Round, RoundEntry, RoundId, Tournament,
    TournamentId, TournamentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("Tournament {0} already has an open round")]
    OpenRoundExists(TournamentId),

    #[error("Transient storage contention: {0}")]
    Contention(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error is worth an automatic bounded-backoff retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Participant row to create at tournament setup
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub account_id: Option<AccountId>,
    pub display_name: String,
    pub is_bot: bool,
    pub invite_status: InviteStatus,
}

impl NewParticipant {
    /// Human participant with a pending invite
    pub fn invitee(account_id: AccountId, display_name: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id),
            display_name: display_name.into(),
            is_bot: false,
            invite_status: InviteStatus::Pending,
        }
    }

    /// Bot participant; auto-accepted, no account
    pub fn bot(display_name: impl Into<String>) -> Self {
        Self {
            account_id: None,
            display_name: display_name.into(),
            is_bot: true,
            invite_status: InviteStatus::Accepted,
        }
    }
}

/// Round row to create when opening the next round
#[derive(Debug, Clone)]
pub struct NewRound {
    pub round_number: u32,
    pub target_id: i64,
    pub target_label: String,
    pub is_elimination: bool,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Outcome of inserting a round entry
#[derive(Debug, Clone)]
pub enum EntryInsert {
    /// First write for this (round, participant) pair
    Inserted(RoundEntry),
    /// Uniqueness constraint hit; existing row left untouched
    Duplicate,
}

/// Per-participant effect of resolving a closed round
#[derive(Debug, Clone)]
pub struct ParticipantUpdate {
    pub participant_id: ParticipantId,
    /// New block accumulator value
    pub block_points: i64,
    /// Transition to eliminated in this resolution
    pub eliminated: bool,
}

/// Atomic state change produced by the elimination engine for one round
#[derive(Debug, Clone, Default)]
pub struct RoundResolutionUpdate {
    pub round_number: u32,
    pub updates: Vec<ParticipantUpdate>,
}

/// Storage operations for the tournament core
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Create a tournament in `lobby` together with its participant roster
    async fn insert_tournament(
        &self,
        owner_account: AccountId,
        config: &TournamentConfig,
        roster: Vec<NewParticipant>,
    ) -> StoreResult<Tournament>;

    /// Fetch a tournament by ID
    async fn tournament(&self, id: TournamentId) -> StoreResult<Tournament>;

    /// List tournaments, optionally filtered by status
    async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> StoreResult<Vec<Tournament>>;

    /// List a tournament's participants
    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>>;

    /// Fetch a single participant of a tournament
    async fn participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<Participant>;

    /// Conditionally flip a participant's invite status.
    ///
    /// Returns `false` when the participant was no longer in `from` or
    /// the tournament has left `lobby`, leaving the row untouched. The
    /// lobby fence lives inside the conditional update itself, so an
    /// invite response can never commit against a live tournament.
    async fn try_set_invite_status(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        from: InviteStatus,
        to: InviteStatus,
    ) -> StoreResult<bool>;

    /// Conditionally transition `lobby -> live`.
    ///
    /// Returns `false` when the tournament was not in `lobby`; exactly one
    /// of any set of concurrent callers observes `true`.
    async fn try_start_tournament(
        &self,
        id: TournamentId,
        started_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Conditionally transition `live -> finished` and set the winner
    async fn try_finish_tournament(
        &self,
        id: TournamentId,
        winner: ParticipantId,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Create the next round. Fails with [`StoreError::OpenRoundExists`]
    /// when the previous round has not closed.
    async fn open_round(&self, tournament_id: TournamentId, round: NewRound) -> StoreResult<Round>;

    /// Fetch a round by ID
    async fn round(&self, round_id: RoundId) -> StoreResult<Round>;

    /// Fetch the highest-numbered round of a tournament, if any
    async fn latest_round(&self, tournament_id: TournamentId) -> StoreResult<Option<Round>>;

    /// Conditionally close a round (`closed_at IS NULL` guard).
    ///
    /// Returns `false` for every caller but the one that wins the close.
    async fn try_close_round(
        &self,
        round_id: RoundId,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Insert a round entry; a duplicate (round, participant) pair is
    /// reported, never double-counted.
    async fn insert_entry(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
        points_earned: i64,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<EntryInsert>;

    /// List entries recorded for a round
    async fn entries(&self, round_id: RoundId) -> StoreResult<Vec<RoundEntry>>;

    /// Apply an elimination resolution as a single atomic unit: block
    /// accumulator updates and survival transitions land together or not
    /// at all.
    async fn apply_resolution(
        &self,
        tournament_id: TournamentId,
        update: &RoundResolutionUpdate,
    ) -> StoreResult<()>;

    /// Lobby tournaments whose join deadline has passed
    async fn lobby_tournaments_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Tournament>>;

    /// Open rounds whose time limit has elapsed
    async fn expired_open_rounds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Round>>;

    /// Live tournaments with no open round (held after a failed target
    /// draw; the sweeper retries these)
    async fn stalled_live_tournaments(&self) -> StoreResult<Vec<Tournament>>;
}
