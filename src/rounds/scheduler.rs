//! Round scheduler: opens rounds, enforces time limits, and owns the
//! conditional close gate.

use super::TargetDraw;
use crate::store::{NewRound, StoreError, TournamentStore};
use crate::tournament::errors::{TournamentError, TournamentResult};
use crate::tournament::models::{
    Participant, Round, RoundEntry, RoundId, Tournament, TournamentStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Round scheduler
#[derive(Clone)]
pub struct RoundScheduler {
    store: Arc<dyn TournamentStore>,
    targets: Arc<dyn TargetDraw>,
}

impl RoundScheduler {
    pub fn new(store: Arc<dyn TournamentStore>, targets: Arc<dyn TargetDraw>) -> Self {
        Self { store, targets }
    }

    /// Open the next round for a live tournament.
    ///
    /// Draws a target, numbers the round monotonically from 1, and stamps
    /// the close deadline from the configured time limit. When a
    /// concurrent caller already opened the round, the existing open round
    /// is returned instead of an error.
    ///
    /// # Errors
    ///
    /// * [`TournamentError::NoEligibleTarget`] - draw failed; the
    ///   tournament is held open and the sweeper retries
    pub async fn open_next_round(&self, tournament: &Tournament) -> TournamentResult<Round> {
        if tournament.status != TournamentStatus::Live {
            return Err(TournamentError::InvalidState {
                expected: TournamentStatus::Live,
                actual: tournament.status,
            });
        }

        let previous = self.store.latest_round(tournament.id).await?;
        if let Some(round) = &previous
            && round.is_open()
        {
            return Ok(round.clone());
        }
        let round_number = previous.map_or(1, |r| r.round_number + 1);

        let target = self
            .targets
            .draw_target(&tournament.config.criteria)
            .await?;

        let started_at = Utc::now();
        let new_round = NewRound {
            round_number,
            target_id: target.id,
            target_label: target.label,
            is_elimination: round_number % tournament.config.elimination_interval == 0,
            started_at,
            ends_at: started_at + tournament.config.round_time_limit(),
        };

        match self.store.open_round(tournament.id, new_round).await {
            Ok(round) => {
                log::info!(
                    "Opened round {} for tournament {} (target {})",
                    round.round_number,
                    tournament.id,
                    round.target_id
                );
                Ok(round)
            }
            // Lost a race to another opener; surface their round
            Err(StoreError::OpenRoundExists(_)) => {
                let round = self
                    .store
                    .latest_round(tournament.id)
                    .await?
                    .ok_or(TournamentError::NotFound(tournament.id))?;
                Ok(round)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Conditionally close a round. Exactly one of any set of concurrent
    /// callers observes `true` and proceeds to run the elimination engine.
    pub async fn try_close(&self, round_id: RoundId, now: DateTime<Utc>) -> TournamentResult<bool> {
        Ok(self.store.try_close_round(round_id, now).await?)
    }

    /// Whether a close is due: the time limit elapsed, or every active
    /// participant has an entry for the round.
    pub fn close_due(
        round: &Round,
        now: DateTime<Utc>,
        participants: &[Participant],
        entries: &[RoundEntry],
    ) -> bool {
        round.is_expired(now) || Self::all_submitted(participants, entries)
    }

    /// Whether every surviving human has an entry for the round. Bots
    /// never submit; their entries are derived when the round resolves.
    pub fn all_submitted(participants: &[Participant], entries: &[RoundEntry]) -> bool {
        let submitted: HashSet<_> = entries.iter().map(|e| e.participant_id).collect();
        participants
            .iter()
            .filter(|p| !p.is_bot && p.is_accepted() && p.is_active())
            .all(|p| submitted.contains(&p.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::models::{InviteStatus, SurvivalState};

    fn participant(id: i64, active: bool) -> Participant {
        Participant {
            id,
            tournament_id: 1,
            account_id: Some(id),
            display_name: format!("p{id}"),
            is_bot: false,
            invite_status: InviteStatus::Accepted,
            survival_state: if active {
                SurvivalState::Active
            } else {
                SurvivalState::Eliminated
            },
            eliminated_at_round: if active { None } else { Some(1) },
            block_points: 0,
        }
    }

    fn entry(participant_id: i64) -> RoundEntry {
        RoundEntry {
            round_id: 1,
            participant_id,
            points_earned: 0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_all_submitted_ignores_eliminated() {
        let participants = vec![participant(1, true), participant(2, true), participant(3, false)];
        assert!(!RoundScheduler::all_submitted(&participants, &[entry(1)]));
        assert!(RoundScheduler::all_submitted(
            &participants,
            &[entry(1), entry(2)]
        ));
    }

    #[test]
    fn test_all_submitted_ignores_bots() {
        let mut bot = participant(9, true);
        bot.is_bot = true;
        bot.account_id = None;
        let participants = vec![participant(1, true), bot];
        assert!(RoundScheduler::all_submitted(&participants, &[entry(1)]));
    }

    #[test]
    fn test_close_due_on_expiry() {
        let now = Utc::now();
        let round = Round {
            id: 1,
            tournament_id: 1,
            round_number: 1,
            target_id: 1,
            target_label: "t".to_string(),
            is_elimination: false,
            started_at: now - chrono::Duration::seconds(120),
            ends_at: now - chrono::Duration::seconds(30),
            closed_at: None,
        };
        let participants = vec![participant(1, true)];
        assert!(RoundScheduler::close_due(&round, now, &participants, &[]));
    }
}
