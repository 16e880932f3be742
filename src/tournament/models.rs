//! Tournament data models.

use crate::config::TournamentConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tournament ID type
pub type TournamentId = i64;

/// Participant ID type
pub type ParticipantId = i64;

/// Round ID type
pub type RoundId = i64;

/// External account ID type (owned by the ledger collaborator)
pub type AccountId = i64;

/// Tournament lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Collecting invite responses
    Lobby,
    /// Rounds in progress
    Live,
    /// Winner decided; immutable from here on
    Finished,
}

impl TournamentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Live => "live",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lobby" => Some(Self::Lobby),
            "live" => Some(Self::Live),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Invite response state for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// Survival state for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivalState {
    Active,
    Eliminated,
}

impl SurvivalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Eliminated => "eliminated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "eliminated" => Some(Self::Eliminated),
            _ => None,
        }
    }
}

/// A knockout tournament instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    /// Tournament ID
    pub id: TournamentId,
    /// Account of the owning participant
    pub owner_account: AccountId,
    /// Lifecycle status
    pub status: TournamentStatus,
    /// Configuration (stake, timing, criteria)
    pub config: TournamentConfig,
    /// Winning participant, set only once finished
    pub winner: Option<ParticipantId>,
    /// Created at timestamp
    pub created_at: DateTime<Utc>,
    /// Started at timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// Finished at timestamp
    pub finished_at: Option<DateTime<Utc>>,
}

/// An entrant (human or bot) in a tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Participant ID
    pub id: ParticipantId,
    /// Owning tournament
    pub tournament_id: TournamentId,
    /// Ledger account; `None` for bots
    pub account_id: Option<AccountId>,
    /// Display name
    pub display_name: String,
    /// Synthetic stand-in flag
    pub is_bot: bool,
    /// Invite response state
    pub invite_status: InviteStatus,
    /// Survival state
    pub survival_state: SurvivalState,
    /// Round number at which the participant was eliminated
    pub eliminated_at_round: Option<u32>,
    /// Running point total since the last elimination checkpoint
    pub block_points: i64,
}

impl Participant {
    /// Whether the participant is still competing
    pub fn is_active(&self) -> bool {
        self.survival_state == SurvivalState::Active
    }

    /// Whether the participant counts toward the accepted roster
    pub fn is_accepted(&self) -> bool {
        self.invite_status == InviteStatus::Accepted
    }
}

/// One timed scoring period within a tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Round ID
    pub id: RoundId,
    /// Owning tournament
    pub tournament_id: TournamentId,
    /// Monotonic round number, starting at 1
    pub round_number: u32,
    /// Drawn mystery target
    pub target_id: i64,
    /// Target display label
    pub target_label: String,
    /// Whether this round is an elimination checkpoint
    pub is_elimination: bool,
    /// Opened at timestamp
    pub started_at: DateTime<Utc>,
    /// Scheduled close time
    pub ends_at: DateTime<Utc>,
    /// Actual close time, `None` while open
    pub closed_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Whether the round is still open
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Whether timeout close is due
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }
}

/// The recorded score of one participant for one round.
///
/// At most one entry exists per (round, participant) pair; rows are
/// immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEntry {
    /// Round the entry belongs to
    pub round_id: RoundId,
    /// Scoring participant
    pub participant_id: ParticipantId,
    /// Points earned in the round
    pub points_earned: i64,
    /// Recorded at timestamp
    pub recorded_at: DateTime<Utc>,
}
