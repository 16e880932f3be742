//! Tournament configuration with typed target-selection criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum allowed round time limit in seconds
pub const MIN_ROUND_TIME_LIMIT_SECS: u32 = 30;

/// Minimum number of participants for a knockout
pub const MIN_PARTICIPANTS_FLOOR: usize = 2;

/// Target difficulty band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

/// Criteria handed to the target-draw service when opening a round.
///
/// The draw policy itself is external; this core only carries the
/// recognized filter fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCriteria {
    /// Restrict draws to a difficulty band
    pub difficulty: Option<Difficulty>,
    /// Restrict draws to a named category
    pub category: Option<String>,
    /// Skip targets the roster has seen recently
    pub exclude_recent: bool,
}

/// Tournament configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    /// Points wagered per accepted participant
    pub stake: i64,
    /// Minimum accepted participants required to start
    pub min_participants: usize,
    /// Time limit for each round in seconds
    pub round_time_limit_secs: u32,
    /// Rounds between elimination checkpoints
    pub elimination_interval: u32,
    /// Deadline after which the lobby is swept for auto-start
    pub join_deadline: Option<DateTime<Utc>>,
    /// Target-selection criteria
    pub criteria: TargetCriteria,
}

impl TournamentConfig {
    /// Create a standard knockout configuration: 90-second rounds with an
    /// elimination checkpoint every 3 rounds.
    pub fn standard(stake: i64) -> Self {
        Self {
            stake,
            min_participants: 2,
            round_time_limit_secs: 90,
            elimination_interval: 3,
            join_deadline: None,
            criteria: TargetCriteria::default(),
        }
    }

    /// Create a blitz knockout (shorter rounds, elimination every round)
    pub fn blitz(stake: i64) -> Self {
        Self {
            round_time_limit_secs: 45,
            elimination_interval: 1,
            ..Self::standard(stake)
        }
    }

    /// Set the join deadline
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.join_deadline = Some(deadline);
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when a parameter is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.stake < 0 {
            return Err(format!("stake must be non-negative, got {}", self.stake));
        }
        if self.min_participants < MIN_PARTICIPANTS_FLOOR {
            return Err(format!(
                "min_participants must be at least {MIN_PARTICIPANTS_FLOOR}, got {}",
                self.min_participants
            ));
        }
        if self.round_time_limit_secs < MIN_ROUND_TIME_LIMIT_SECS {
            return Err(format!(
                "round_time_limit_secs must be at least {MIN_ROUND_TIME_LIMIT_SECS}, got {}",
                self.round_time_limit_secs
            ));
        }
        if self.elimination_interval < 1 {
            return Err("elimination_interval must be at least 1".to_string());
        }
        Ok(())
    }

    /// Round time limit as a chrono duration
    pub fn round_time_limit(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.round_time_limit_secs))
    }
}
