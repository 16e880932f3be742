//! Elimination engine implementation.
//!
//! Invoked exactly once per round close, by the caller that won the
//! conditional close. The elimination decision is a pure function over
//! already-committed round entries, so replaying the engine for the same
//! round computes the same result; the state change is applied as one
//! atomic unit.

use crate::retry::with_default_backoff;
use crate::scoring::{BotScoringAdapter, ScoringAdapter};
use crate::store::{EntryInsert, ParticipantUpdate, RoundResolutionUpdate, TournamentStore};
use crate::tournament::errors::TournamentResult;
use crate::tournament::models::{Participant, ParticipantId, Round, RoundEntry, Tournament};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Result of resolving one closed round
#[derive(Debug, Clone)]
pub struct RoundResolution {
    /// Round number that was resolved
    pub round_number: u32,
    /// Participants eliminated at this checkpoint (empty for
    /// non-elimination rounds and full ties)
    pub eliminated: Vec<ParticipantId>,
    /// Set when exactly one active participant remains
    pub winner: Option<ParticipantId>,
}

/// Elimination engine
#[derive(Clone)]
pub struct EliminationEngine {
    store: Arc<dyn TournamentStore>,
    scoring: ScoringAdapter,
    bots: BotScoringAdapter,
}

impl EliminationEngine {
    pub fn new(store: Arc<dyn TournamentStore>, scoring: ScoringAdapter) -> Self {
        Self {
            store,
            scoring,
            bots: BotScoringAdapter,
        }
    }

    /// Resolve a closed round: record outstanding entries, roll this
    /// round's points into the block accumulators, and on elimination
    /// rounds remove every active participant at the minimum accumulator
    /// unless all are tied. Survivors' accumulators reset to zero at each
    /// checkpoint.
    pub async fn resolve(
        &self,
        tournament: &Tournament,
        round: &Round,
    ) -> TournamentResult<RoundResolution> {
        let participants = self.store.participants(tournament.id).await?;
        // Invitees who never accepted are not in the field
        let actives: Vec<&Participant> = participants
            .iter()
            .filter(|p| p.is_accepted() && p.is_active())
            .collect();

        self.record_missing_entries(&participants, &actives, round)
            .await?;
        let entries = self.store.entries(round.id).await?;
        let points: HashMap<ParticipantId, i64> = entries
            .iter()
            .map(|e| (e.participant_id, e.points_earned))
            .collect();

        let accumulators: Vec<(ParticipantId, i64)> = actives
            .iter()
            .map(|p| (p.id, p.block_points + points.get(&p.id).copied().unwrap_or(0)))
            .collect();

        let eliminated = if round.is_elimination {
            decide_eliminations(&accumulators)
        } else {
            Vec::new()
        };
        let eliminated_set: HashSet<ParticipantId> = eliminated.iter().copied().collect();

        let updates = accumulators
            .iter()
            .map(|&(id, total)| {
                let is_out = eliminated_set.contains(&id);
                ParticipantUpdate {
                    participant_id: id,
                    // Accumulators reset at every checkpoint; eliminated
                    // participants keep their final total for readers.
                    block_points: if round.is_elimination && !is_out {
                        0
                    } else {
                        total
                    },
                    eliminated: is_out,
                }
            })
            .collect();
        let update = RoundResolutionUpdate {
            round_number: round.round_number,
            updates,
        };

        with_default_backoff(|| async {
            self.store.apply_resolution(tournament.id, &update).await
        })
        .await?;

        let survivors: Vec<ParticipantId> = actives
            .iter()
            .map(|p| p.id)
            .filter(|id| !eliminated_set.contains(id))
            .collect();
        let winner = match survivors.as_slice() {
            [single] => Some(*single),
            _ => None,
        };

        if !eliminated.is_empty() {
            log::info!(
                "Tournament {}: round {} eliminated {:?}, {} remaining",
                tournament.id,
                round.round_number,
                eliminated,
                survivors.len()
            );
        }

        Ok(RoundResolution {
            round_number: round.round_number,
            eliminated,
            winner,
        })
    }

    /// Write round entries for every active participant that lacks one:
    /// humans score whatever the recorder has (zero on no attempt), bots
    /// score the rounded mean of the round's human entries.
    async fn record_missing_entries(
        &self,
        participants: &[Participant],
        actives: &[&Participant],
        round: &Round,
    ) -> TournamentResult<()> {
        let recorded: HashSet<ParticipantId> = self
            .store
            .entries(round.id)
            .await?
            .iter()
            .map(|e| e.participant_id)
            .collect();
        let now = Utc::now();

        for participant in actives.iter().filter(|p| !p.is_bot) {
            if recorded.contains(&participant.id) {
                continue;
            }
            let score = self.scoring.score_for(round.id, participant.id).await?;
            // A concurrent submission may have landed first; that row wins
            if let EntryInsert::Duplicate = self
                .store
                .insert_entry(round.id, participant.id, score, now)
                .await?
            {
                log::debug!(
                    "Entry for participant {} in round {} raced ahead of close",
                    participant.id,
                    round.id
                );
            }
        }

        let human_points = human_points_for_round(
            participants,
            &self.store.entries(round.id).await?,
        );
        let bot_score = self.bots.score(&human_points);
        for participant in actives.iter().filter(|p| p.is_bot) {
            if recorded.contains(&participant.id) {
                continue;
            }
            self.store
                .insert_entry(round.id, participant.id, bot_score, now)
                .await?;
        }
        Ok(())
    }
}

/// Points earned this round by accepted human participants
fn human_points_for_round(participants: &[Participant], entries: &[RoundEntry]) -> Vec<i64> {
    let humans: HashSet<ParticipantId> = participants
        .iter()
        .filter(|p| !p.is_bot && p.is_accepted())
        .map(|p| p.id)
        .collect();
    entries
        .iter()
        .filter(|e| humans.contains(&e.participant_id))
        .map(|e| e.points_earned)
        .collect()
}

/// Pure elimination decision over block accumulators.
///
/// Every participant at the minimum accumulator is removed, unless the
/// minimum equals the maximum (all tied) in which case nobody is.
pub fn decide_eliminations(accumulators: &[(ParticipantId, i64)]) -> Vec<ParticipantId> {
    if accumulators.len() <= 1 {
        return Vec::new();
    }
    let min = accumulators.iter().map(|&(_, v)| v).min();
    let max = accumulators.iter().map(|&(_, v)| v).max();
    let (Some(min), Some(max)) = (min, max) else {
        return Vec::new();
    };
    if min == max {
        return Vec::new();
    }
    accumulators
        .iter()
        .filter(|&&(_, v)| v == min)
        .map(|&(id, _)| id)
        .collect()
}
