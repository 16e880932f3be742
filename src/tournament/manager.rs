//! Tournament manager: the root orchestrator of the knockout lifecycle.

use super::errors::{TournamentError, TournamentResult};
use super::models::{
    AccountId, Participant, ParticipantId, Round, RoundEntry, RoundId, Tournament, TournamentId,
    TournamentStatus,
};
use crate::config::TournamentConfig;
use crate::elimination::{EliminationEngine, RoundResolution};
use crate::events::{Notifier, TournamentEvent};
use crate::invite::{InviteManager, InviteOutcome};
use crate::ledger::Ledger;
use crate::retry::with_default_backoff;
use crate::rounds::{RoundScheduler, TargetDraw};
use crate::scoring::{GameplayRecorder, ScoringAdapter};
use crate::store::{EntryInsert, NewParticipant, TournamentStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A human to invite at tournament setup
#[derive(Debug, Clone)]
pub struct Invitee {
    pub account_id: AccountId,
    pub display_name: String,
}

impl Invitee {
    pub fn new(account_id: AccountId, display_name: impl Into<String>) -> Self {
        Self {
            account_id,
            display_name: display_name.into(),
        }
    }
}

/// Outcome of a start attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This caller performed the `lobby -> live` transition
    Started,
    /// Another caller already started (or finished) the tournament
    AlreadyStarted,
}

/// Outcome of a score submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Entry recorded; `round_closed` is set when this submission was the
    /// last one expected and triggered the close
    Recorded { points: i64, round_closed: bool },
    /// An entry already existed for this (round, participant) pair
    Duplicate,
}

/// Outcome of a round-close attempt
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// This caller won the close and ran the elimination engine
    Closed(RoundResolution),
    /// Another caller already closed the round
    AlreadyClosed,
    /// Neither the time limit nor full submission has been reached
    NotDue,
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    store: Arc<dyn TournamentStore>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    scoring: ScoringAdapter,
    scheduler: RoundScheduler,
    engine: EliminationEngine,
    invites: InviteManager,
}

impl TournamentManager {
    /// Create a manager wired to its storage and collaborators
    pub fn new(
        store: Arc<dyn TournamentStore>,
        ledger: Arc<dyn Ledger>,
        targets: Arc<dyn TargetDraw>,
        recorder: Arc<dyn GameplayRecorder>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let scoring = ScoringAdapter::new(recorder);
        Self {
            scheduler: RoundScheduler::new(store.clone(), targets),
            engine: EliminationEngine::new(store.clone(), scoring.clone()),
            invites: InviteManager::new(store.clone(), ledger.clone()),
            scoring,
            store,
            ledger,
            notifier,
        }
    }

    /// Create a tournament in `lobby` with its roster: the owner and the
    /// invitees pending, bots auto-accepted.
    ///
    /// # Errors
    ///
    /// * [`TournamentError::InvalidConfig`] - parameters out of range
    pub async fn create(
        &self,
        owner: Invitee,
        config: TournamentConfig,
        invitees: Vec<Invitee>,
        bot_count: usize,
    ) -> TournamentResult<Tournament> {
        config.validate().map_err(TournamentError::InvalidConfig)?;

        let mut roster = vec![NewParticipant::invitee(owner.account_id, owner.display_name)];
        roster.extend(
            invitees
                .into_iter()
                .map(|i| NewParticipant::invitee(i.account_id, i.display_name)),
        );
        roster.extend((1..=bot_count).map(|n| NewParticipant::bot(format!("bot-{n}"))));
        let roster_size = roster.len();

        let tournament = self
            .store
            .insert_tournament(owner.account_id, &config, roster)
            .await?;
        log::info!(
            "Created tournament {} (stake {}, {} roster slots)",
            tournament.id,
            config.stake,
            roster_size
        );
        Ok(tournament)
    }

    /// Transition `lobby -> live` and open round 1.
    ///
    /// Idempotent under concurrency: exactly one of any set of callers
    /// observes [`StartOutcome::Started`]; the rest get
    /// [`StartOutcome::AlreadyStarted`] without side effects.
    ///
    /// # Errors
    ///
    /// * [`TournamentError::NotEnoughAccepted`] - fewer accepted
    ///   participants than the configured minimum
    pub async fn start(&self, tournament_id: TournamentId) -> TournamentResult<StartOutcome> {
        let tournament = self.store.tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Lobby {
            return Ok(StartOutcome::AlreadyStarted);
        }

        let participants = self.store.participants(tournament_id).await?;
        let accepted = participants.iter().filter(|p| p.is_accepted()).count();
        if accepted < tournament.config.min_participants {
            return Err(TournamentError::NotEnoughAccepted {
                needed: tournament.config.min_participants,
                accepted,
            });
        }

        let started = with_default_backoff(|| async {
            self.store.try_start_tournament(tournament_id, Utc::now()).await
        })
        .await?;
        if !started {
            return Ok(StartOutcome::AlreadyStarted);
        }

        log::info!("Tournament {tournament_id} started with {accepted} accepted participants");
        self.notifier
            .publish(TournamentEvent::TournamentStarted { tournament_id })
            .await;

        let live = self.store.tournament(tournament_id).await?;
        self.open_round_held(&live).await?;
        Ok(StartOutcome::Started)
    }

    /// Accept an invite (stake debit included)
    pub async fn accept_invite(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> TournamentResult<InviteOutcome> {
        self.invites.accept(tournament_id, participant_id).await
    }

    /// Decline an invite
    pub async fn decline_invite(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> TournamentResult<InviteOutcome> {
        self.invites.decline(tournament_id, participant_id).await
    }

    /// Record a participant's score for an open round.
    ///
    /// The points come from the gameplay-recording collaborator. When this
    /// submission completes the active field, the round closes immediately
    /// rather than waiting out the time limit.
    pub async fn submit_entry(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> TournamentResult<SubmitOutcome> {
        let round = self.store.round(round_id).await?;
        if !round.is_open() {
            return Err(TournamentError::RoundClosed(round_id));
        }
        let participant = self
            .store
            .participant(round.tournament_id, participant_id)
            .await?;
        if participant.is_bot || !participant.is_accepted() || !participant.is_active() {
            return Err(TournamentError::NotEligible(participant_id));
        }

        let points = self.scoring.score_for(round_id, participant_id).await?;
        let inserted = self
            .store
            .insert_entry(round_id, participant_id, points, Utc::now())
            .await?;
        if let EntryInsert::Duplicate = inserted {
            return Ok(SubmitOutcome::Duplicate);
        }

        let participants = self.store.participants(round.tournament_id).await?;
        let entries = self.store.entries(round_id).await?;
        let mut round_closed = false;
        if RoundScheduler::all_submitted(&participants, &entries) {
            round_closed = matches!(
                self.close_round(round_id, Utc::now()).await?,
                CloseOutcome::Closed(_)
            );
        }
        Ok(SubmitOutcome::Recorded {
            points,
            round_closed,
        })
    }

    /// Close a round and resolve it.
    ///
    /// Only due rounds close (time limit elapsed or every active
    /// participant submitted), only one concurrent caller wins the close,
    /// and the elimination engine runs synchronously before this returns.
    pub async fn close_round(
        &self,
        round_id: RoundId,
        now: DateTime<Utc>,
    ) -> TournamentResult<CloseOutcome> {
        let round = self.store.round(round_id).await?;
        if !round.is_open() {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        let tournament = self.store.tournament(round.tournament_id).await?;

        let participants = self.store.participants(tournament.id).await?;
        let entries = self.store.entries(round_id).await?;
        if !RoundScheduler::close_due(&round, now, &participants, &entries) {
            return Ok(CloseOutcome::NotDue);
        }

        if !self.scheduler.try_close(round_id, now).await? {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        let resolution = self.engine.resolve(&tournament, &round).await?;
        for participant_id in &resolution.eliminated {
            self.notifier
                .publish(TournamentEvent::ParticipantEliminated {
                    tournament_id: tournament.id,
                    participant_id: *participant_id,
                    round_number: resolution.round_number,
                })
                .await;
        }

        match resolution.winner {
            Some(winner) => self.finalize(&tournament, winner).await?,
            None => {
                let live = self.store.tournament(tournament.id).await?;
                self.open_round_held(&live).await?;
            }
        }
        Ok(CloseOutcome::Closed(resolution))
    }

    /// Join-deadline sweep: attempt a start for every lobby tournament
    /// past its deadline. Safe to run redundantly from multiple workers.
    pub async fn sweep_join_deadlines(&self, now: DateTime<Utc>) -> TournamentResult<usize> {
        let mut started = 0;
        for tournament in self.invites.due_for_start(now).await? {
            match self.start(tournament.id).await {
                Ok(StartOutcome::Started) => started += 1,
                Ok(StartOutcome::AlreadyStarted) => {}
                // Deadline passed without enough accepts: stay in lobby
                Err(TournamentError::NotEnoughAccepted { needed, accepted }) => {
                    log::debug!(
                        "Tournament {} past deadline with {accepted}/{needed} accepted, holding",
                        tournament.id
                    );
                }
                Err(err) => {
                    log::warn!("Deadline start of tournament {} failed: {err}", tournament.id);
                }
            }
        }
        Ok(started)
    }

    /// Timeout sweep: close every open round whose time limit elapsed
    pub async fn sweep_expired_rounds(&self, now: DateTime<Utc>) -> TournamentResult<usize> {
        let mut closed = 0;
        for round in self.store.expired_open_rounds(now).await? {
            match self.close_round(round.id, now).await {
                Ok(CloseOutcome::Closed(_)) => closed += 1,
                Ok(_) => {}
                Err(err) => {
                    log::warn!("Timeout close of round {} failed: {err}", round.id);
                }
            }
        }
        Ok(closed)
    }

    /// Retry sweep for live tournaments held without an open round.
    ///
    /// A held tournament is either waiting on a target draw that failed,
    /// or stuck mid-finalize with a sole survivor whose pot credit did
    /// not go through. The sweep re-drives the right half: finalize when
    /// one active participant remains, otherwise the next round.
    pub async fn sweep_stalled_tournaments(&self) -> TournamentResult<usize> {
        let mut resolved = 0;
        for tournament in self.store.stalled_live_tournaments().await? {
            let participants = self.store.participants(tournament.id).await?;
            let actives: Vec<ParticipantId> = participants
                .iter()
                .filter(|p| p.is_accepted() && p.is_active())
                .map(|p| p.id)
                .collect();
            let progressed = match actives.as_slice() {
                [winner] => match self.finalize(&tournament, *winner).await {
                    Ok(()) => true,
                    Err(err) => {
                        log::warn!(
                            "Finalize retry of tournament {} failed: {err}",
                            tournament.id
                        );
                        false
                    }
                },
                _ => self.open_round_held(&tournament).await?,
            };
            if progressed {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Run every sweep once; used by the background sweeper
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> TournamentResult<()> {
        let started = self.sweep_join_deadlines(now).await?;
        let closed = self.sweep_expired_rounds(now).await?;
        let resolved = self.sweep_stalled_tournaments().await?;
        if started + closed + resolved > 0 {
            log::debug!(
                "Sweep: {started} started, {closed} rounds closed, {resolved} stalls resolved"
            );
        }
        Ok(())
    }

    /// Fetch a tournament
    pub async fn tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        Ok(self.store.tournament(id).await?)
    }

    /// List tournaments, optionally filtered by status
    pub async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> TournamentResult<Vec<Tournament>> {
        Ok(self.store.list_tournaments(status).await?)
    }

    /// List a tournament's participants
    pub async fn participants(&self, id: TournamentId) -> TournamentResult<Vec<Participant>> {
        Ok(self.store.participants(id).await?)
    }

    /// Fetch the latest round of a tournament
    pub async fn latest_round(&self, id: TournamentId) -> TournamentResult<Option<Round>> {
        Ok(self.store.latest_round(id).await?)
    }

    /// List the entries recorded for a round
    pub async fn round_entries(&self, round_id: RoundId) -> TournamentResult<Vec<RoundEntry>> {
        Ok(self.store.entries(round_id).await?)
    }

    /// Credit the pot to the winner, then transition `live -> finished`
    /// and announce the result.
    ///
    /// The keyed credit lands before the status flip: a credit failure
    /// leaves the tournament live with no open round, and the stalled
    /// sweep re-drives this method until both halves have applied. Once
    /// the credit has committed, a replay of it is a no-op.
    async fn finalize(
        &self,
        tournament: &Tournament,
        winner: ParticipantId,
    ) -> TournamentResult<()> {
        let participants = self.store.participants(tournament.id).await?;
        let accepted = participants.iter().filter(|p| p.is_accepted()).count();
        let pot = tournament.config.stake * accepted as i64;

        let winner_account = participants
            .iter()
            .find(|p| p.id == winner)
            .and_then(|p| p.account_id);
        match winner_account {
            Some(account) if pot > 0 => {
                let pot_key = format!("pot_{}", tournament.id);
                with_default_backoff(|| async {
                    self.ledger.credit(account, pot, &pot_key).await
                })
                .await?;
            }
            _ => {
                log::info!(
                    "Tournament {}: pot of {pot} not credited (bot winner or zero stake)",
                    tournament.id
                );
            }
        }

        let finished = with_default_backoff(|| async {
            self.store
                .try_finish_tournament(tournament.id, winner, Utc::now())
                .await
        })
        .await?;
        if !finished {
            return Ok(());
        }

        log::info!(
            "Tournament {} finished, winner {winner}, pot {pot}",
            tournament.id
        );
        self.notifier
            .publish(TournamentEvent::TournamentFinished {
                tournament_id: tournament.id,
                winner,
            })
            .await;
        Ok(())
    }

    /// Open the next round, treating a failed target draw as a hold: the
    /// tournament stays live without an open round and the sweeper
    /// retries. Returns whether a round is now open.
    async fn open_round_held(&self, tournament: &Tournament) -> TournamentResult<bool> {
        match self.scheduler.open_next_round(tournament).await {
            Ok(round) => {
                self.notifier
                    .publish(TournamentEvent::RoundOpened {
                        tournament_id: tournament.id,
                        round_id: round.id,
                        round_number: round.round_number,
                    })
                    .await;
                Ok(true)
            }
            Err(TournamentError::NoEligibleTarget) => {
                log::warn!(
                    "Tournament {} held: no eligible target, will retry",
                    tournament.id
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
