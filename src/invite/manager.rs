//! Invite manager: accept/decline negotiation and the join-deadline sweep
//! listing.
//!
//! Responses are idempotent: repeating the same outcome is a no-op, while
//! flipping an explicit decline to an accept is rejected. Accepting debits
//! the stake through the ledger collaborator before the status flips, so
//! an accepted participant has always paid. The flip itself is fenced on
//! the lobby status inside the store's conditional update, so a response
//! racing a start can never land on a live tournament.

use crate::ledger::Ledger;
use crate::store::TournamentStore;
use crate::tournament::errors::{TournamentError, TournamentResult};
use crate::tournament::models::{
    InviteStatus, ParticipantId, Tournament, TournamentId, TournamentStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of an invite response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The response was applied
    Applied,
    /// The participant had already given the same response
    AlreadyApplied,
}

/// Invite and join manager
#[derive(Clone)]
pub struct InviteManager {
    store: Arc<dyn TournamentStore>,
    ledger: Arc<dyn Ledger>,
}

impl InviteManager {
    pub fn new(store: Arc<dyn TournamentStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self { store, ledger }
    }

    /// Accept an invite, debiting the stake from the participant's account.
    ///
    /// # Errors
    ///
    /// * [`TournamentError::AlreadyResponded`] - the invite was declined
    /// * [`TournamentError::InsufficientFunds`] - stake debit failed; the
    ///   invite stays `pending`
    pub async fn accept(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> TournamentResult<InviteOutcome> {
        let tournament = self.lobby_tournament(tournament_id).await?;
        let participant = self.store.participant(tournament_id, participant_id).await?;

        match participant.invite_status {
            InviteStatus::Accepted => return Ok(InviteOutcome::AlreadyApplied),
            InviteStatus::Declined => {
                return Err(TournamentError::AlreadyResponded(participant_id));
            }
            InviteStatus::Pending => {}
        }

        // Bots are auto-accepted at setup and never reach pending
        let account = participant
            .account_id
            .ok_or(TournamentError::NotEligible(participant_id))?;

        let stake = tournament.config.stake;
        if stake > 0 {
            let stake_key = format!("stake_{tournament_id}_{participant_id}");
            self.ledger.debit(account, stake, &stake_key).await?;
        }

        let flipped = self
            .store
            .try_set_invite_status(
                tournament_id,
                participant_id,
                InviteStatus::Pending,
                InviteStatus::Accepted,
            )
            .await?;
        if flipped {
            log::info!("Participant {participant_id} accepted invite to tournament {tournament_id}");
            return Ok(InviteOutcome::Applied);
        }

        // Lost a race: either another response or a start landed between
        // our read and the conditional flip. The keyed debit applied at
        // most once; refund it whenever the accept did not stick.
        let current = self.store.participant(tournament_id, participant_id).await?;
        match current.invite_status {
            InviteStatus::Accepted => Ok(InviteOutcome::AlreadyApplied),
            _ => {
                if stake > 0 {
                    let refund_key = format!("stake_refund_{tournament_id}_{participant_id}");
                    self.ledger.credit(account, stake, &refund_key).await?;
                }
                Err(self.response_race_error(tournament_id, participant_id).await?)
            }
        }
    }

    /// Decline an invite. Repeating a decline is a no-op; declining after
    /// an accept is rejected.
    pub async fn decline(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> TournamentResult<InviteOutcome> {
        self.lobby_tournament(tournament_id).await?;
        let participant = self.store.participant(tournament_id, participant_id).await?;

        match participant.invite_status {
            InviteStatus::Declined => return Ok(InviteOutcome::AlreadyApplied),
            InviteStatus::Accepted => {
                return Err(TournamentError::AlreadyResponded(participant_id));
            }
            InviteStatus::Pending => {}
        }

        let flipped = self
            .store
            .try_set_invite_status(
                tournament_id,
                participant_id,
                InviteStatus::Pending,
                InviteStatus::Declined,
            )
            .await?;
        if flipped {
            log::info!("Participant {participant_id} declined invite to tournament {tournament_id}");
            return Ok(InviteOutcome::Applied);
        }

        let current = self.store.participant(tournament_id, participant_id).await?;
        match current.invite_status {
            InviteStatus::Declined => Ok(InviteOutcome::AlreadyApplied),
            _ => Err(self.response_race_error(tournament_id, participant_id).await?),
        }
    }

    /// Lobby tournaments whose join deadline has passed, due for an
    /// auto-start attempt
    pub async fn due_for_start(&self, now: DateTime<Utc>) -> TournamentResult<Vec<Tournament>> {
        Ok(self.store.lobby_tournaments_past_deadline(now).await?)
    }

    /// Explain a lost response race: the tournament left the lobby, or
    /// a conflicting response won the flip
    async fn response_race_error(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> TournamentResult<TournamentError> {
        let tournament = self.store.tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Lobby {
            return Ok(TournamentError::InvalidState {
                expected: TournamentStatus::Lobby,
                actual: tournament.status,
            });
        }
        Ok(TournamentError::AlreadyResponded(participant_id))
    }

    async fn lobby_tournament(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        let tournament = self.store.tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Lobby {
            return Err(TournamentError::InvalidState {
                expected: TournamentStatus::Lobby,
                actual: tournament.status,
            });
        }
        Ok(tournament)
    }
}
