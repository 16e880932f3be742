//! In-memory store backend.
//!
//! Keeps all tournament state behind a single `RwLock`, which makes every
//! conditional operation atomic with respect to concurrent callers. Used
//! for tests and embedded, single-process deployments.

use super::{
    EntryInsert, NewParticipant, NewRound, RoundResolutionUpdate, StoreError, StoreResult,
    TournamentStore,
};
use crate::config::TournamentConfig;
use crate::tournament::models::{
    AccountId, InviteStatus, Participant, ParticipantId, Round, RoundEntry, RoundId, SurvivalState,
    Tournament, TournamentId, TournamentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    tournaments: HashMap<TournamentId, Tournament>,
    /// Participants keyed by tournament, in creation order
    participants: HashMap<TournamentId, Vec<Participant>>,
    rounds: HashMap<RoundId, Round>,
    /// Round IDs per tournament, in round-number order
    tournament_rounds: HashMap<TournamentId, Vec<RoundId>>,
    entries: HashMap<RoundId, Vec<RoundEntry>>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory tournament store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn insert_tournament(
        &self,
        owner_account: AccountId,
        config: &TournamentConfig,
        roster: Vec<NewParticipant>,
    ) -> StoreResult<Tournament> {
        let mut inner = self.inner.write().await;
        let id = inner.allocate_id();
        let tournament = Tournament {
            id,
            owner_account,
            status: TournamentStatus::Lobby,
            config: config.clone(),
            winner: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let participants = roster
            .into_iter()
            .map(|p| {
                let pid = inner.allocate_id();
                Participant {
                    id: pid,
                    tournament_id: id,
                    account_id: p.account_id,
                    display_name: p.display_name,
                    is_bot: p.is_bot,
                    invite_status: p.invite_status,
                    survival_state: SurvivalState::Active,
                    eliminated_at_round: None,
                    block_points: 0,
                }
            })
            .collect();
        inner.tournaments.insert(id, tournament.clone());
        inner.participants.insert(id, participants);
        inner.tournament_rounds.insert(id, Vec::new());
        Ok(tournament)
    }

    async fn tournament(&self, id: TournamentId) -> StoreResult<Tournament> {
        let inner = self.inner.read().await;
        inner
            .tournaments
            .get(&id)
            .cloned()
            .ok_or(StoreError::TournamentNotFound(id))
    }

    async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> StoreResult<Vec<Tournament>> {
        let inner = self.inner.read().await;
        let mut tournaments: Vec<Tournament> = inner
            .tournaments
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tournaments.sort_by_key(|t| t.id);
        Ok(tournaments)
    }

    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>> {
        let inner = self.inner.read().await;
        inner
            .participants
            .get(&tournament_id)
            .cloned()
            .ok_or(StoreError::TournamentNotFound(tournament_id))
    }

    async fn participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<Participant> {
        let inner = self.inner.read().await;
        inner
            .participants
            .get(&tournament_id)
            .ok_or(StoreError::TournamentNotFound(tournament_id))?
            .iter()
            .find(|p| p.id == participant_id)
            .cloned()
            .ok_or(StoreError::ParticipantNotFound(participant_id))
    }

    async fn try_set_invite_status(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        from: InviteStatus,
        to: InviteStatus,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        // The lobby check and the flip share the write lock, so a start
        // landing in between cannot let a response through.
        let status = inner
            .tournaments
            .get(&tournament_id)
            .ok_or(StoreError::TournamentNotFound(tournament_id))?
            .status;
        if status != TournamentStatus::Lobby {
            return Ok(false);
        }
        let participant = inner
            .participants
            .get_mut(&tournament_id)
            .ok_or(StoreError::TournamentNotFound(tournament_id))?
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or(StoreError::ParticipantNotFound(participant_id))?;
        if participant.invite_status != from {
            return Ok(false);
        }
        participant.invite_status = to;
        Ok(true)
    }

    async fn try_start_tournament(
        &self,
        id: TournamentId,
        started_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let tournament = inner
            .tournaments
            .get_mut(&id)
            .ok_or(StoreError::TournamentNotFound(id))?;
        if tournament.status != TournamentStatus::Lobby {
            return Ok(false);
        }
        tournament.status = TournamentStatus::Live;
        tournament.started_at = Some(started_at);
        Ok(true)
    }

    async fn try_finish_tournament(
        &self,
        id: TournamentId,
        winner: ParticipantId,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let tournament = inner
            .tournaments
            .get_mut(&id)
            .ok_or(StoreError::TournamentNotFound(id))?;
        if tournament.status != TournamentStatus::Live {
            return Ok(false);
        }
        tournament.status = TournamentStatus::Finished;
        tournament.winner = Some(winner);
        tournament.finished_at = Some(finished_at);
        Ok(true)
    }

    async fn open_round(&self, tournament_id: TournamentId, round: NewRound) -> StoreResult<Round> {
        let mut inner = self.inner.write().await;
        if !inner.tournaments.contains_key(&tournament_id) {
            return Err(StoreError::TournamentNotFound(tournament_id));
        }
        let has_open = inner
            .tournament_rounds
            .get(&tournament_id)
            .into_iter()
            .flatten()
            .any(|rid| inner.rounds.get(rid).is_some_and(Round::is_open));
        if has_open {
            return Err(StoreError::OpenRoundExists(tournament_id));
        }
        let id = inner.allocate_id();
        let round = Round {
            id,
            tournament_id,
            round_number: round.round_number,
            target_id: round.target_id,
            target_label: round.target_label,
            is_elimination: round.is_elimination,
            started_at: round.started_at,
            ends_at: round.ends_at,
            closed_at: None,
        };
        inner.rounds.insert(id, round.clone());
        inner
            .tournament_rounds
            .entry(tournament_id)
            .or_default()
            .push(id);
        inner.entries.insert(id, Vec::new());
        Ok(round)
    }

    async fn round(&self, round_id: RoundId) -> StoreResult<Round> {
        let inner = self.inner.read().await;
        inner
            .rounds
            .get(&round_id)
            .cloned()
            .ok_or(StoreError::RoundNotFound(round_id))
    }

    async fn latest_round(&self, tournament_id: TournamentId) -> StoreResult<Option<Round>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tournament_rounds
            .get(&tournament_id)
            .and_then(|rounds| rounds.last())
            .and_then(|rid| inner.rounds.get(rid))
            .cloned())
    }

    async fn try_close_round(
        &self,
        round_id: RoundId,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let round = inner
            .rounds
            .get_mut(&round_id)
            .ok_or(StoreError::RoundNotFound(round_id))?;
        if round.closed_at.is_some() {
            return Ok(false);
        }
        round.closed_at = Some(closed_at);
        Ok(true)
    }

    async fn insert_entry(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
        points_earned: i64,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<EntryInsert> {
        let mut inner = self.inner.write().await;
        if !inner.rounds.contains_key(&round_id) {
            return Err(StoreError::RoundNotFound(round_id));
        }
        let entries = inner.entries.entry(round_id).or_default();
        if entries.iter().any(|e| e.participant_id == participant_id) {
            return Ok(EntryInsert::Duplicate);
        }
        let entry = RoundEntry {
            round_id,
            participant_id,
            points_earned,
            recorded_at,
        };
        entries.push(entry.clone());
        Ok(EntryInsert::Inserted(entry))
    }

    async fn entries(&self, round_id: RoundId) -> StoreResult<Vec<RoundEntry>> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&round_id)
            .cloned()
            .ok_or(StoreError::RoundNotFound(round_id))
    }

    async fn apply_resolution(
        &self,
        tournament_id: TournamentId,
        update: &RoundResolutionUpdate,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let participants = inner
            .participants
            .get_mut(&tournament_id)
            .ok_or(StoreError::TournamentNotFound(tournament_id))?;
        for change in &update.updates {
            let participant = participants
                .iter_mut()
                .find(|p| p.id == change.participant_id)
                .ok_or(StoreError::ParticipantNotFound(change.participant_id))?;
            participant.block_points = change.block_points;
            if change.eliminated && participant.survival_state == SurvivalState::Active {
                participant.survival_state = SurvivalState::Eliminated;
                participant.eliminated_at_round = Some(update.round_number);
            }
        }
        Ok(())
    }

    async fn lobby_tournaments_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Tournament>> {
        let inner = self.inner.read().await;
        let mut due: Vec<Tournament> = inner
            .tournaments
            .values()
            .filter(|t| {
                t.status == TournamentStatus::Lobby
                    && t.config.join_deadline.is_some_and(|d| now >= d)
            })
            .cloned()
            .collect();
        due.sort_by_key(|t| t.id);
        Ok(due)
    }

    async fn expired_open_rounds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Round>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<Round> = inner
            .rounds
            .values()
            .filter(|r| r.is_open() && r.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.id);
        Ok(expired)
    }

    async fn stalled_live_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let inner = self.inner.read().await;
        let mut stalled: Vec<Tournament> = inner
            .tournaments
            .values()
            .filter(|t| {
                t.status == TournamentStatus::Live
                    && !inner
                        .tournament_rounds
                        .get(&t.id)
                        .into_iter()
                        .flatten()
                        .any(|rid| inner.rounds.get(rid).is_some_and(Round::is_open))
            })
            .cloned()
            .collect();
        stalled.sort_by_key(|t| t.id);
        Ok(stalled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TournamentConfig;

    fn roster() -> Vec<NewParticipant> {
        vec![
            NewParticipant::invitee(10, "alva"),
            NewParticipant::invitee(11, "birk"),
            NewParticipant::bot("bot-1"),
        ]
    }

    #[tokio::test]
    async fn test_insert_and_fetch_tournament() {
        let store = MemoryStore::new();
        let config = TournamentConfig::standard(100);
        let tournament = store.insert_tournament(10, &config, roster()).await.unwrap();
        assert_eq!(tournament.status, TournamentStatus::Lobby);

        let participants = store.participants(tournament.id).await.unwrap();
        assert_eq!(participants.len(), 3);
        assert!(participants[2].is_bot);
        assert_eq!(participants[2].invite_status, InviteStatus::Accepted);
    }

    #[tokio::test]
    async fn test_conditional_start_is_single_winner() {
        let store = MemoryStore::new();
        let config = TournamentConfig::standard(100);
        let tournament = store.insert_tournament(10, &config, roster()).await.unwrap();

        let now = Utc::now();
        assert!(store.try_start_tournament(tournament.id, now).await.unwrap());
        assert!(!store.try_start_tournament(tournament.id, now).await.unwrap());
        assert_eq!(
            store.tournament(tournament.id).await.unwrap().status,
            TournamentStatus::Live
        );
    }

    #[tokio::test]
    async fn test_invite_flip_blocked_after_start() {
        let store = MemoryStore::new();
        let config = TournamentConfig::standard(100);
        let tournament = store.insert_tournament(10, &config, roster()).await.unwrap();
        let participants = store.participants(tournament.id).await.unwrap();

        assert!(store.try_start_tournament(tournament.id, Utc::now()).await.unwrap());

        // The flip loses once the tournament is live, even with the
        // invite still pending
        let flipped = store
            .try_set_invite_status(
                tournament.id,
                participants[0].id,
                InviteStatus::Pending,
                InviteStatus::Accepted,
            )
            .await
            .unwrap();
        assert!(!flipped);
        assert_eq!(
            store
                .participant(tournament.id, participants[0].id)
                .await
                .unwrap()
                .invite_status,
            InviteStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_single_open_round_invariant() {
        let store = MemoryStore::new();
        let config = TournamentConfig::standard(100);
        let tournament = store.insert_tournament(10, &config, roster()).await.unwrap();
        let now = Utc::now();
        let new_round = |n: u32| NewRound {
            round_number: n,
            target_id: 1,
            target_label: "t".to_string(),
            is_elimination: false,
            started_at: now,
            ends_at: now + chrono::Duration::seconds(90),
        };

        let round = store.open_round(tournament.id, new_round(1)).await.unwrap();
        let err = store.open_round(tournament.id, new_round(2)).await;
        assert!(matches!(err, Err(StoreError::OpenRoundExists(_))));

        assert!(store.try_close_round(round.id, now).await.unwrap());
        assert!(!store.try_close_round(round.id, now).await.unwrap());
        store.open_round(tournament.id, new_round(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_entry_rejected() {
        let store = MemoryStore::new();
        let config = TournamentConfig::standard(100);
        let tournament = store.insert_tournament(10, &config, roster()).await.unwrap();
        let participants = store.participants(tournament.id).await.unwrap();
        let now = Utc::now();
        let round = store
            .open_round(
                tournament.id,
                NewRound {
                    round_number: 1,
                    target_id: 1,
                    target_label: "t".to_string(),
                    is_elimination: false,
                    started_at: now,
                    ends_at: now + chrono::Duration::seconds(90),
                },
            )
            .await
            .unwrap();

        let first = store
            .insert_entry(round.id, participants[0].id, 42, now)
            .await
            .unwrap();
        assert!(matches!(first, EntryInsert::Inserted(_)));

        let second = store
            .insert_entry(round.id, participants[0].id, 99, now)
            .await
            .unwrap();
        assert!(matches!(second, EntryInsert::Duplicate));

        let entries = store.entries(round.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].points_earned, 42);
    }
}
