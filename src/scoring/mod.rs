//! Scoring adapters.
//!
//! Human scores come from the external gameplay-recording collaborator; a
//! missing attempt is worth zero, not an error. Bot scores are derived
//! from the human field of the same round, binding a bot's difficulty to
//! the roster's actual performance rather than a fixed value.

use crate::tournament::models::{ParticipantId, RoundId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Scoring errors
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Gameplay-recording collaborator unreachable
    #[error("Gameplay recorder unavailable: {0}")]
    RecorderUnavailable(String),
}

pub type ScoringResult<T> = Result<T, ScoringError>;

/// External gameplay-recording collaborator.
///
/// `None` means the participant made no attempt before the round closed;
/// the collaborator has already validated a single attempt per participant
/// per round upstream.
#[async_trait]
pub trait GameplayRecorder: Send + Sync {
    async fn attempt_points(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> ScoringResult<Option<i64>>;
}

/// Retrieves a participant's raw score for a round
#[derive(Clone)]
pub struct ScoringAdapter {
    recorder: Arc<dyn GameplayRecorder>,
}

impl ScoringAdapter {
    pub fn new(recorder: Arc<dyn GameplayRecorder>) -> Self {
        Self { recorder }
    }

    /// Score for a participant in a round; zero when no attempt exists
    pub async fn score_for(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> ScoringResult<i64> {
        let points = self
            .recorder
            .attempt_points(round_id, participant_id)
            .await?;
        Ok(points.unwrap_or(0))
    }
}

/// Derives a synthetic score for bot participants
#[derive(Debug, Clone, Copy, Default)]
pub struct BotScoringAdapter;

impl BotScoringAdapter {
    /// Rounded mean of the human scores recorded for the round; zero when
    /// no human entry exists yet.
    pub fn score(&self, human_points: &[i64]) -> i64 {
        if human_points.is_empty() {
            return 0;
        }
        let sum: i64 = human_points.iter().sum();
        let mean = sum as f64 / human_points.len() as f64;
        mean.round() as i64
    }
}

/// In-memory gameplay recorder for tests and local play
#[derive(Default)]
pub struct MemoryRecorder {
    attempts: RwLock<HashMap<(RoundId, ParticipantId), i64>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt's points for a participant in a round
    pub async fn record(&self, round_id: RoundId, participant_id: ParticipantId, points: i64) {
        self.attempts
            .write()
            .await
            .insert((round_id, participant_id), points);
    }
}

#[async_trait]
impl GameplayRecorder for MemoryRecorder {
    async fn attempt_points(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> ScoringResult<Option<i64>> {
        Ok(self
            .attempts
            .read()
            .await
            .get(&(round_id, participant_id))
            .copied())
    }
}
