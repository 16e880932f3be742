//! Tournament error types.

use crate::ledger::LedgerError;
use crate::rounds::TargetDrawError;
use crate::scoring::ScoringError;
use crate::store::StoreError;
use crate::tournament::models::{AccountId, ParticipantId, RoundId, TournamentId, TournamentStatus};
use thiserror::Error;

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("Invalid tournament configuration: {0}")]
    InvalidConfig(String),

    #[error("Tournament not in correct state: expected {expected:?}, got {actual:?}")]
    InvalidState {
        expected: TournamentStatus,
        actual: TournamentStatus,
    },

    #[error("Not enough accepted participants: need {needed}, have {accepted}")]
    NotEnoughAccepted { needed: usize, accepted: usize },

    #[error("Participant {0} already responded to the invite")]
    AlreadyResponded(ParticipantId),

    #[error("Insufficient funds for account {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        required: i64,
    },

    #[error("No eligible target for the tournament criteria")]
    NoEligibleTarget,

    #[error("Round {0} is already closed")]
    RoundClosed(RoundId),

    #[error("Participant {0} is not eligible for this action")]
    NotEligible(ParticipantId),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Target-draw error: {0}")]
    TargetDraw(TargetDrawError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type TournamentResult<T> = Result<T, TournamentError>;

impl From<LedgerError> for TournamentError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                account,
                available,
                required,
            } => Self::InsufficientFunds {
                account,
                available,
                required,
            },
            other => Self::Ledger(other),
        }
    }
}

impl From<TargetDrawError> for TournamentError {
    fn from(err: TargetDrawError) -> Self {
        match err {
            TargetDrawError::NoEligibleTarget => Self::NoEligibleTarget,
            other => Self::TargetDraw(other),
        }
    }
}
