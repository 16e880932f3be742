//! PostgreSQL store backend.
//!
//! Conditional transitions are expressed as guarded `UPDATE ... RETURNING`
//! statements, duplicate round entries are absorbed by the primary key via
//! `ON CONFLICT DO NOTHING`, and elimination resolutions run inside one
//! transaction. Serialization failures surface as transient contention so
//! callers can retry with backoff.

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
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;

/// Postgres serialization-failure SQLSTATE
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL tournament store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn map_error(err: sqlx::Error) -> StoreError {
        if let Some(db_err) = err.as_database_error()
            && db_err.code().as_deref() == Some(SERIALIZATION_FAILURE)
        {
            return StoreError::Contention(db_err.message().to_string());
        }
        StoreError::Database(err)
    }

    fn tournament_from_row(row: &PgRow) -> StoreResult<Tournament> {
        let status_str: String = row.get("status");
        let status = TournamentStatus::parse(&status_str).unwrap_or(TournamentStatus::Lobby);
        let criteria = serde_json::from_value(row.get::<serde_json::Value, _>("criteria"))?;
        Ok(Tournament {
            id: row.get("id"),
            owner_account: row.get("owner_account"),
            status,
            config: TournamentConfig {
                stake: row.get("stake"),
                min_participants: row.get::<i32, _>("min_participants") as usize,
                round_time_limit_secs: row.get::<i32, _>("round_time_limit_secs") as u32,
                elimination_interval: row.get::<i32, _>("elimination_interval") as u32,
                join_deadline: row
                    .get::<Option<chrono::NaiveDateTime>, _>("join_deadline")
                    .map(|dt| dt.and_utc()),
                criteria,
            },
            winner: row.get("winner_id"),
            created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
            started_at: row
                .get::<Option<chrono::NaiveDateTime>, _>("started_at")
                .map(|dt| dt.and_utc()),
            finished_at: row
                .get::<Option<chrono::NaiveDateTime>, _>("finished_at")
                .map(|dt| dt.and_utc()),
        })
    }

    fn participant_from_row(row: &PgRow) -> Participant {
        let invite_str: String = row.get("invite_status");
        let survival_str: String = row.get("survival_state");
        Participant {
            id: row.get("id"),
            tournament_id: row.get("tournament_id"),
            account_id: row.get("account_id"),
            display_name: row.get("display_name"),
            is_bot: row.get("is_bot"),
            invite_status: InviteStatus::parse(&invite_str).unwrap_or(InviteStatus::Pending),
            survival_state: SurvivalState::parse(&survival_str).unwrap_or(SurvivalState::Active),
            eliminated_at_round: row
                .get::<Option<i32>, _>("eliminated_at_round")
                .map(|r| r as u32),
            block_points: row.get("block_points"),
        }
    }

    fn round_from_row(row: &PgRow) -> Round {
        Round {
            id: row.get("id"),
            tournament_id: row.get("tournament_id"),
            round_number: row.get::<i32, _>("round_number") as u32,
            target_id: row.get("target_id"),
            target_label: row.get("target_label"),
            is_elimination: row.get("is_elimination"),
            started_at: row.get::<chrono::NaiveDateTime, _>("started_at").and_utc(),
            ends_at: row.get::<chrono::NaiveDateTime, _>("ends_at").and_utc(),
            closed_at: row
                .get::<Option<chrono::NaiveDateTime>, _>("closed_at")
                .map(|dt| dt.and_utc()),
        }
    }

    fn entry_from_row(row: &PgRow) -> RoundEntry {
        RoundEntry {
            round_id: row.get("round_id"),
            participant_id: row.get("participant_id"),
            points_earned: row.get("points_earned"),
            recorded_at: row.get::<chrono::NaiveDateTime, _>("recorded_at").and_utc(),
        }
    }
}

const TOURNAMENT_COLUMNS: &str = "id, owner_account, status, stake, min_participants, \
     round_time_limit_secs, elimination_interval, join_deadline, criteria, winner_id, \
     created_at, started_at, finished_at";

const PARTICIPANT_COLUMNS: &str = "id, tournament_id, account_id, display_name, is_bot, \
     invite_status, survival_state, eliminated_at_round, block_points";

const ROUND_COLUMNS: &str = "id, tournament_id, round_number, target_id, target_label, \
     is_elimination, started_at, ends_at, closed_at";

#[async_trait]
impl TournamentStore for PgStore {
    async fn insert_tournament(
        &self,
        owner_account: AccountId,
        config: &TournamentConfig,
        roster: Vec<NewParticipant>,
    ) -> StoreResult<Tournament> {
        let criteria = serde_json::to_value(&config.criteria)?;
        let mut tx = self.pool.begin().await.map_err(Self::map_error)?;

        let row = sqlx::query(&format!(
            "INSERT INTO tournaments (owner_account, status, stake, min_participants, \
             round_time_limit_secs, elimination_interval, join_deadline, criteria) \
             VALUES ($1, 'lobby', $2, $3, $4, $5, $6, $7) \
             RETURNING {TOURNAMENT_COLUMNS}"
        ))
        .bind(owner_account)
        .bind(config.stake)
        .bind(config.min_participants as i32)
        .bind(config.round_time_limit_secs as i32)
        .bind(config.elimination_interval as i32)
        .bind(config.join_deadline.map(|d| d.naive_utc()))
        .bind(criteria)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::map_error)?;

        let tournament = Self::tournament_from_row(&row)?;

        for p in roster {
            sqlx::query(
                "INSERT INTO participants \
                 (tournament_id, account_id, display_name, is_bot, invite_status) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(tournament.id)
            .bind(p.account_id)
            .bind(&p.display_name)
            .bind(p.is_bot)
            .bind(p.invite_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(Self::map_error)?;
        }

        tx.commit().await.map_err(Self::map_error)?;
        Ok(tournament)
    }

    async fn tournament(&self, id: TournamentId) -> StoreResult<Tournament> {
        let row = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?
        .ok_or(StoreError::TournamentNotFound(id))?;
        Self::tournament_from_row(&row)
    }

    async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> StoreResult<Vec<Tournament>> {
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE status = $1 ORDER BY id"
            ))
            .bind(status.as_str())
            .fetch_all(self.pool.as_ref())
            .await
        } else {
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments ORDER BY id"
            ))
            .fetch_all(self.pool.as_ref())
            .await
        }
        .map_err(Self::map_error)?;
        rows.iter().map(Self::tournament_from_row).collect()
    }

    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>> {
        // Distinguish an empty roster from a missing tournament
        self.tournament(tournament_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE tournament_id = $1 ORDER BY id"
        ))
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(rows.iter().map(Self::participant_from_row).collect())
    }

    async fn participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<Participant> {
        let row = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants \
             WHERE tournament_id = $1 AND id = $2"
        ))
        .bind(tournament_id)
        .bind(participant_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?
        .ok_or(StoreError::ParticipantNotFound(participant_id))?;
        Ok(Self::participant_from_row(&row))
    }

    async fn try_set_invite_status(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
        from: InviteStatus,
        to: InviteStatus,
    ) -> StoreResult<bool> {
        // The EXISTS clause fences the flip on the lobby status in the
        // same statement, closing the gap against a concurrent start.
        let result = sqlx::query(
            "UPDATE participants SET invite_status = $1 \
             WHERE tournament_id = $2 AND id = $3 AND invite_status = $4 \
             AND EXISTS (SELECT 1 FROM tournaments \
                         WHERE id = $2 AND status = 'lobby')",
        )
        .bind(to.as_str())
        .bind(tournament_id)
        .bind(participant_id)
        .bind(from.as_str())
        .execute(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_start_tournament(
        &self,
        id: TournamentId,
        started_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tournaments SET status = 'live', started_at = $1 \
             WHERE id = $2 AND status = 'lobby'",
        )
        .bind(started_at.naive_utc())
        .bind(id)
        .execute(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_finish_tournament(
        &self,
        id: TournamentId,
        winner: ParticipantId,
        finished_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tournaments SET status = 'finished', winner_id = $1, finished_at = $2 \
             WHERE id = $3 AND status = 'live'",
        )
        .bind(winner)
        .bind(finished_at.naive_utc())
        .bind(id)
        .execute(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn open_round(&self, tournament_id: TournamentId, round: NewRound) -> StoreResult<Round> {
        // The partial unique index on (tournament_id) WHERE closed_at IS NULL
        // turns a concurrent double-open into a constraint violation.
        let result = sqlx::query(&format!(
            "INSERT INTO rounds (tournament_id, round_number, target_id, target_label, \
             is_elimination, started_at, ends_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ROUND_COLUMNS}"
        ))
        .bind(tournament_id)
        .bind(round.round_number as i32)
        .bind(round.target_id)
        .bind(&round.target_label)
        .bind(round.is_elimination)
        .bind(round.started_at.naive_utc())
        .bind(round.ends_at.naive_utc())
        .fetch_one(self.pool.as_ref())
        .await;

        match result {
            Ok(row) => Ok(Self::round_from_row(&row)),
            Err(err) => {
                if err
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    Err(StoreError::OpenRoundExists(tournament_id))
                } else {
                    Err(Self::map_error(err))
                }
            }
        }
    }

    async fn round(&self, round_id: RoundId) -> StoreResult<Round> {
        let row = sqlx::query(&format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE id = $1"))
            .bind(round_id)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(Self::map_error)?
            .ok_or(StoreError::RoundNotFound(round_id))?;
        Ok(Self::round_from_row(&row))
    }

    async fn latest_round(&self, tournament_id: TournamentId) -> StoreResult<Option<Round>> {
        let row = sqlx::query(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds WHERE tournament_id = $1 \
             ORDER BY round_number DESC LIMIT 1"
        ))
        .bind(tournament_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(row.as_ref().map(Self::round_from_row))
    }

    async fn try_close_round(
        &self,
        round_id: RoundId,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE rounds SET closed_at = $1 WHERE id = $2 AND closed_at IS NULL",
        )
        .bind(closed_at.naive_utc())
        .bind(round_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_entry(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
        points_earned: i64,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<EntryInsert> {
        let row = sqlx::query(
            "INSERT INTO round_entries (round_id, participant_id, points_earned, recorded_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (round_id, participant_id) DO NOTHING \
             RETURNING round_id, participant_id, points_earned, recorded_at",
        )
        .bind(round_id)
        .bind(participant_id)
        .bind(points_earned)
        .bind(recorded_at.naive_utc())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;

        Ok(match row {
            Some(row) => EntryInsert::Inserted(Self::entry_from_row(&row)),
            None => EntryInsert::Duplicate,
        })
    }

    async fn entries(&self, round_id: RoundId) -> StoreResult<Vec<RoundEntry>> {
        self.round(round_id).await?;
        let rows = sqlx::query(
            "SELECT round_id, participant_id, points_earned, recorded_at \
             FROM round_entries WHERE round_id = $1 ORDER BY participant_id",
        )
        .bind(round_id)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(rows.iter().map(Self::entry_from_row).collect())
    }

    async fn apply_resolution(
        &self,
        tournament_id: TournamentId,
        update: &RoundResolutionUpdate,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(Self::map_error)?;
        for change in &update.updates {
            if change.eliminated {
                sqlx::query(
                    "UPDATE participants \
                     SET block_points = $1, survival_state = 'eliminated', \
                         eliminated_at_round = $2 \
                     WHERE tournament_id = $3 AND id = $4 AND survival_state = 'active'",
                )
                .bind(change.block_points)
                .bind(update.round_number as i32)
                .bind(tournament_id)
                .bind(change.participant_id)
                .execute(&mut *tx)
                .await
                .map_err(Self::map_error)?;
            } else {
                sqlx::query(
                    "UPDATE participants SET block_points = $1 \
                     WHERE tournament_id = $2 AND id = $3",
                )
                .bind(change.block_points)
                .bind(tournament_id)
                .bind(change.participant_id)
                .execute(&mut *tx)
                .await
                .map_err(Self::map_error)?;
            }
        }
        tx.commit().await.map_err(Self::map_error)?;
        Ok(())
    }

    async fn lobby_tournaments_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments \
             WHERE status = 'lobby' AND join_deadline IS NOT NULL AND join_deadline <= $1 \
             ORDER BY id"
        ))
        .bind(now.naive_utc())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        rows.iter().map(Self::tournament_from_row).collect()
    }

    async fn expired_open_rounds(&self, now: DateTime<Utc>) -> StoreResult<Vec<Round>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds \
             WHERE closed_at IS NULL AND ends_at <= $1 ORDER BY id"
        ))
        .bind(now.naive_utc())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        Ok(rows.iter().map(Self::round_from_row).collect())
    }

    async fn stalled_live_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments t \
             WHERE status = 'live' AND NOT EXISTS \
             (SELECT 1 FROM rounds r WHERE r.tournament_id = t.id AND r.closed_at IS NULL) \
             ORDER BY id"
        ))
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(Self::map_error)?;
        rows.iter().map(Self::tournament_from_row).collect()
    }
}
