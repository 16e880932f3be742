//! Integration tests for the knockout lifecycle: invites and stake
//! debits, round play, checkpoint eliminations, and the final payout.
//!
//! Everything runs against the in-memory backends, so these tests need
//! no database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use knockout_arena::config::TournamentConfig;
use knockout_arena::invite::InviteOutcome;
use knockout_arena::ledger::{Ledger, LedgerError, LedgerResult, MemoryLedger};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use knockout_arena::config::TargetCriteria;
use knockout_arena::rounds::{RotatingTargets, Target, TargetDraw, TargetDrawError};
use tokio::sync::Mutex;
use knockout_arena::scoring::MemoryRecorder;
use knockout_arena::tournament::models::{
    AccountId, InviteStatus, ParticipantId, SurvivalState, TournamentId,
};
use knockout_arena::{
    BroadcastNotifier, CloseOutcome, Invitee, MemoryStore, Round, StartOutcome, SubmitOutcome,
    Tournament, TournamentError, TournamentManager, TournamentStatus,
};

const FUNDS: i64 = 1_000;

/// Test harness wiring a manager to in-memory collaborators
struct Arena {
    manager: TournamentManager,
    ledger: Arc<MemoryLedger>,
    recorder: Arc<MemoryRecorder>,
    notifier: Arc<BroadcastNotifier>,
}

impl Arena {
    fn new() -> Self {
        Self::with_targets(Arc::new(RotatingTargets::numbered(16)))
    }

    fn with_targets(targets: Arc<dyn TargetDraw>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let ledger = Arc::new(MemoryLedger::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let notifier = Arc::new(BroadcastNotifier::new());
        let manager = TournamentManager::new(
            Arc::new(MemoryStore::new()),
            ledger.clone(),
            targets,
            recorder.clone(),
            notifier.clone(),
        );
        Self {
            manager,
            ledger,
            recorder,
            notifier,
        }
    }

    /// Create a tournament whose humans are funded and have all accepted.
    /// `names[0]` is the owner; accounts are numbered from 101.
    async fn accepted_tournament(
        &self,
        config: TournamentConfig,
        names: &[&str],
        bot_count: usize,
    ) -> Tournament {
        for (i, _) in names.iter().enumerate() {
            self.ledger.fund(101 + i as i64, FUNDS).await;
        }
        let owner = Invitee::new(101, names[0]);
        let invitees = names[1..]
            .iter()
            .enumerate()
            .map(|(i, name)| Invitee::new(102 + i as i64, *name))
            .collect();
        let tournament = self
            .manager
            .create(owner, config, invitees, bot_count)
            .await
            .unwrap();
        for name in names {
            let id = self.participant_id(tournament.id, name).await;
            self.manager.accept_invite(tournament.id, id).await.unwrap();
        }
        tournament
    }

    /// Accept everyone, start, and hand back the open first round
    async fn running_tournament(
        &self,
        config: TournamentConfig,
        names: &[&str],
        bot_count: usize,
    ) -> (Tournament, Round) {
        let tournament = self.accepted_tournament(config, names, bot_count).await;
        assert_eq!(
            self.manager.start(tournament.id).await.unwrap(),
            StartOutcome::Started
        );
        let round = self.open_round(tournament.id).await;
        (tournament, round)
    }

    async fn participant_id(&self, tournament_id: TournamentId, name: &str) -> ParticipantId {
        self.manager
            .participants(tournament_id)
            .await
            .unwrap()
            .iter()
            .find(|p| p.display_name == name)
            .map(|p| p.id)
            .unwrap_or_else(|| panic!("no participant named {name}"))
    }

    async fn open_round(&self, tournament_id: TournamentId) -> Round {
        let round = self
            .manager
            .latest_round(tournament_id)
            .await
            .unwrap()
            .expect("a round should exist");
        assert!(round.is_open(), "latest round should be open");
        round
    }

    /// Record `points` with the gameplay recorder and submit the entry
    async fn submit(
        &self,
        tournament_id: TournamentId,
        round: &Round,
        name: &str,
        points: i64,
    ) -> SubmitOutcome {
        let id = self.participant_id(tournament_id, name).await;
        self.recorder.record(round.id, id, points).await;
        self.manager.submit_entry(round.id, id).await.unwrap()
    }
}

#[tokio::test]
async fn test_checkpoint_eliminates_lowest_and_resets_survivors() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob", "cyn"], 0)
        .await;
    assert!(round.is_elimination);

    arena.submit(tournament.id, &round, "ann", 10).await;
    arena.submit(tournament.id, &round, "bob", 10).await;
    let last = arena.submit(tournament.id, &round, "cyn", 5).await;
    assert!(matches!(
        last,
        SubmitOutcome::Recorded {
            points: 5,
            round_closed: true
        }
    ));

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let by_name = |name: &str| {
        participants
            .iter()
            .find(|p| p.display_name == name)
            .unwrap()
    };
    let cyn = by_name("cyn");
    assert_eq!(cyn.survival_state, SurvivalState::Eliminated);
    assert_eq!(cyn.eliminated_at_round, Some(1));
    assert_eq!(cyn.block_points, 5);
    for name in ["ann", "bob"] {
        let p = by_name(name);
        assert_eq!(p.survival_state, SurvivalState::Active);
        assert_eq!(p.block_points, 0, "survivor accumulators reset");
    }

    // Two survivors remain, so a second round opened
    let next = arena.open_round(tournament.id).await;
    assert_eq!(next.round_number, 2);
    assert_eq!(
        arena
            .manager
            .tournament(tournament.id)
            .await
            .unwrap()
            .status,
        TournamentStatus::Live
    );
}

#[tokio::test]
async fn test_full_tie_eliminates_nobody() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob", "cyn"], 0)
        .await;

    for name in ["ann", "bob", "cyn"] {
        arena.submit(tournament.id, &round, name, 10).await;
    }

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    assert!(
        participants
            .iter()
            .all(|p| p.survival_state == SurvivalState::Active),
        "a full tie removes nobody"
    );
    // The checkpoint still resets accumulators
    assert!(participants.iter().all(|p| p.block_points == 0));
    assert_eq!(arena.open_round(tournament.id).await.round_number, 2);
}

#[tokio::test]
async fn test_accumulators_carry_between_checkpoints() {
    let arena = Arena::new();
    // Standard config: checkpoint every 3 rounds
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::standard(100), &["ann", "bob"], 0)
        .await;
    assert!(!round.is_elimination);

    arena.submit(tournament.id, &round, "ann", 7).await;
    arena.submit(tournament.id, &round, "bob", 3).await;

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    assert!(
        participants
            .iter()
            .all(|p| p.survival_state == SurvivalState::Active),
        "no eliminations outside checkpoints"
    );
    let points: Vec<i64> = participants.iter().map(|p| p.block_points).collect();
    assert!(points.contains(&7) && points.contains(&3));

    let round2 = arena.open_round(tournament.id).await;
    assert_eq!(round2.round_number, 2);
    arena.submit(tournament.id, &round2, "ann", 1).await;
    arena.submit(tournament.id, &round2, "bob", 4).await;

    let ann = arena.participant_id(tournament.id, "ann").await;
    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let ann_points = participants.iter().find(|p| p.id == ann).unwrap().block_points;
    assert_eq!(ann_points, 8, "7 + 1 carried into round 3");

    let round3 = arena.open_round(tournament.id).await;
    assert!(round3.is_elimination, "round 3 is the checkpoint");
}

#[tokio::test]
async fn test_winner_takes_the_pot() {
    let arena = Arena::new();
    let mut events = arena.notifier.subscribe();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob"], 0)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;
    arena.submit(tournament.id, &round, "bob", 5).await;

    let finished = arena.manager.tournament(tournament.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Finished);
    let ann = arena.participant_id(tournament.id, "ann").await;
    assert_eq!(finished.winner, Some(ann));
    assert!(finished.finished_at.is_some());

    // Both staked 100; ann gets the whole pot back
    assert_eq!(arena.ledger.balance(101).await.unwrap(), FUNDS + 100);
    assert_eq!(arena.ledger.balance(102).await.unwrap(), FUNDS - 100);

    // The stream saw the whole lifecycle
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(serde_json::to_value(&event).unwrap()["event"]
            .as_str()
            .unwrap()
            .to_string());
    }
    assert_eq!(
        kinds,
        vec![
            "tournament_started",
            "round_opened",
            "participant_eliminated",
            "tournament_finished"
        ]
    );
}

#[tokio::test]
async fn test_bot_scores_mean_of_human_field() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::standard(100), &["ann", "bob"], 1)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;
    // Bob's submission is the last human one and closes the round; the
    // bot entry is derived at close.
    let outcome = arena.submit(tournament.id, &round, "bob", 15).await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Recorded {
            round_closed: true,
            ..
        }
    ));

    let bot = arena.participant_id(tournament.id, "bot-1").await;
    let entries = arena.manager.round_entries(round.id).await.unwrap();
    let bot_entry = entries.iter().find(|e| e.participant_id == bot).unwrap();
    assert_eq!(bot_entry.points_earned, 13, "mean of 10 and 15, rounded");
}

#[tokio::test]
async fn test_bot_rides_checkpoints_while_lowest_human_exits() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob", "cyn"], 1)
        .await;

    // Human field 12/9/3 gives the bot a derived 8; cyn is the minimum
    arena.submit(tournament.id, &round, "ann", 12).await;
    arena.submit(tournament.id, &round, "bob", 9).await;
    arena.submit(tournament.id, &round, "cyn", 3).await;

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let cyn = participants.iter().find(|p| p.display_name == "cyn").unwrap();
    assert_eq!(cyn.survival_state, SurvivalState::Eliminated);
    let bot = participants.iter().find(|p| p.is_bot).unwrap();
    assert_eq!(bot.survival_state, SurvivalState::Active);
    assert_eq!(bot.block_points, 0, "surviving bot resets like any survivor");
}

#[tokio::test]
async fn test_timeout_close_zero_fills_absent_entries() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob"], 0)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;

    // Not due yet: bob has the rest of the time limit
    let early = arena
        .manager
        .close_round(round.id, Utc::now())
        .await
        .unwrap();
    assert!(matches!(early, CloseOutcome::NotDue));

    // Past the deadline the close proceeds and bob scores zero
    let late = round.ends_at + Duration::seconds(1);
    let resolution = match arena.manager.close_round(round.id, late).await.unwrap() {
        CloseOutcome::Closed(resolution) => resolution,
        other => panic!("expected the close to win, got {other:?}"),
    };
    let bob = arena.participant_id(tournament.id, "bob").await;
    assert_eq!(resolution.eliminated, vec![bob]);

    let entries = arena.manager.round_entries(round.id).await.unwrap();
    let bob_entry = entries.iter().find(|e| e.participant_id == bob).unwrap();
    assert_eq!(bob_entry.points_earned, 0);
}

#[tokio::test]
async fn test_submit_rejected_after_close() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob", "cyn"], 0)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;
    arena.submit(tournament.id, &round, "bob", 8).await;
    arena.submit(tournament.id, &round, "cyn", 5).await;

    // cyn is out and the round is closed; a late attempt bounces
    let cyn = arena.participant_id(tournament.id, "cyn").await;
    let err = arena.manager.submit_entry(round.id, cyn).await.unwrap_err();
    assert!(matches!(err, TournamentError::RoundClosed(_)));
}

#[tokio::test]
async fn test_eliminated_participant_cannot_submit() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob", "cyn"], 0)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;
    arena.submit(tournament.id, &round, "bob", 8).await;
    arena.submit(tournament.id, &round, "cyn", 5).await;

    let round2 = arena.open_round(tournament.id).await;
    let cyn = arena.participant_id(tournament.id, "cyn").await;
    let err = arena.manager.submit_entry(round2.id, cyn).await.unwrap_err();
    assert!(matches!(err, TournamentError::NotEligible(_)));
}

#[tokio::test]
async fn test_create_rejects_invalid_config() {
    let arena = Arena::new();
    let config = TournamentConfig {
        round_time_limit_secs: 5,
        ..TournamentConfig::standard(100)
    };
    let err = arena
        .manager
        .create(Invitee::new(101, "ann"), config, vec![], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, TournamentError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_accept_is_idempotent_and_decline_is_final() {
    let arena = Arena::new();
    arena.ledger.fund(101, FUNDS).await;
    arena.ledger.fund(102, FUNDS).await;
    let tournament = arena
        .manager
        .create(
            Invitee::new(101, "ann"),
            TournamentConfig::standard(100),
            vec![Invitee::new(102, "bob")],
            0,
        )
        .await
        .unwrap();

    let ann = arena.participant_id(tournament.id, "ann").await;
    assert_eq!(
        arena.manager.accept_invite(tournament.id, ann).await.unwrap(),
        InviteOutcome::Applied
    );
    assert_eq!(
        arena.manager.accept_invite(tournament.id, ann).await.unwrap(),
        InviteOutcome::AlreadyApplied
    );
    // The keyed debit applied exactly once
    assert_eq!(arena.ledger.balance(101).await.unwrap(), FUNDS - 100);

    let bob = arena.participant_id(tournament.id, "bob").await;
    arena.manager.decline_invite(tournament.id, bob).await.unwrap();
    let err = arena
        .manager
        .accept_invite(tournament.id, bob)
        .await
        .unwrap_err();
    assert!(matches!(err, TournamentError::AlreadyResponded(_)));
    assert_eq!(arena.ledger.balance(102).await.unwrap(), FUNDS);

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let bob_row = participants.iter().find(|p| p.id == bob).unwrap();
    assert_eq!(bob_row.invite_status, InviteStatus::Declined);
}

#[tokio::test]
async fn test_accept_rejected_once_live() {
    let arena = Arena::new();
    arena.ledger.fund(101, FUNDS).await;
    arena.ledger.fund(102, FUNDS).await;
    arena.ledger.fund(103, FUNDS).await;
    let tournament = arena
        .manager
        .create(
            Invitee::new(101, "ann"),
            TournamentConfig::blitz(100),
            vec![Invitee::new(102, "bob"), Invitee::new(103, "cyn")],
            0,
        )
        .await
        .unwrap();
    for name in ["ann", "bob"] {
        let id = arena.participant_id(tournament.id, name).await;
        arena.manager.accept_invite(tournament.id, id).await.unwrap();
    }
    arena.manager.start(tournament.id).await.unwrap();

    // cyn's pending response cannot land on the live tournament, and no
    // stake leaves the account
    let cyn = arena.participant_id(tournament.id, "cyn").await;
    let err = arena
        .manager
        .accept_invite(tournament.id, cyn)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TournamentError::InvalidState {
            actual: TournamentStatus::Live,
            ..
        }
    ));
    assert_eq!(arena.ledger.balance(103).await.unwrap(), FUNDS);
    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let cyn_row = participants.iter().find(|p| p.id == cyn).unwrap();
    assert_eq!(cyn_row.invite_status, InviteStatus::Pending);
}

#[tokio::test]
async fn test_insufficient_funds_keeps_invite_pending() {
    let arena = Arena::new();
    arena.ledger.fund(101, 40).await;
    let tournament = arena
        .manager
        .create(
            Invitee::new(101, "ann"),
            TournamentConfig::standard(100),
            vec![],
            0,
        )
        .await
        .unwrap();

    let ann = arena.participant_id(tournament.id, "ann").await;
    let err = arena
        .manager
        .accept_invite(tournament.id, ann)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TournamentError::InsufficientFunds {
            available: 40,
            required: 100,
            ..
        }
    ));

    let participants = arena.manager.participants(tournament.id).await.unwrap();
    assert_eq!(participants[0].invite_status, InviteStatus::Pending);
    assert_eq!(arena.ledger.balance(101).await.unwrap(), 40);
}

#[tokio::test]
async fn test_start_requires_minimum_accepted() {
    let arena = Arena::new();
    arena.ledger.fund(101, FUNDS).await;
    let config = TournamentConfig {
        min_participants: 3,
        ..TournamentConfig::standard(100)
    };
    let tournament = arena
        .manager
        .create(
            Invitee::new(101, "ann"),
            config,
            vec![Invitee::new(102, "bob")],
            1,
        )
        .await
        .unwrap();

    // Only ann and the bot have accepted
    let ann = arena.participant_id(tournament.id, "ann").await;
    arena.manager.accept_invite(tournament.id, ann).await.unwrap();

    let err = arena.manager.start(tournament.id).await.unwrap_err();
    assert!(matches!(
        err,
        TournamentError::NotEnoughAccepted {
            needed: 3,
            accepted: 2
        }
    ));
    assert_eq!(
        arena
            .manager
            .tournament(tournament.id)
            .await
            .unwrap()
            .status,
        TournamentStatus::Lobby
    );
}

#[tokio::test]
async fn test_pending_invitees_never_enter_the_field() {
    let arena = Arena::new();
    arena.ledger.fund(101, FUNDS).await;
    arena.ledger.fund(102, FUNDS).await;
    let tournament = arena
        .manager
        .create(
            Invitee::new(101, "ann"),
            TournamentConfig::blitz(100),
            vec![Invitee::new(102, "bob"), Invitee::new(103, "cyn")],
            1,
        )
        .await
        .unwrap();
    for name in ["ann", "bob"] {
        let id = arena.participant_id(tournament.id, name).await;
        arena.manager.accept_invite(tournament.id, id).await.unwrap();
    }
    arena.manager.start(tournament.id).await.unwrap();

    // cyn never accepted and cannot play
    let round = arena.open_round(tournament.id).await;
    let cyn = arena.participant_id(tournament.id, "cyn").await;
    let err = arena.manager.submit_entry(round.id, cyn).await.unwrap_err();
    assert!(matches!(err, TournamentError::NotEligible(_)));

    // The round closes once both accepted humans submit, and cyn gets
    // neither an entry nor an elimination mark
    arena.submit(tournament.id, &round, "ann", 10).await;
    arena.submit(tournament.id, &round, "bob", 10).await;
    let entries = arena.manager.round_entries(round.id).await.unwrap();
    assert!(entries.iter().all(|e| e.participant_id != cyn));
    let participants = arena.manager.participants(tournament.id).await.unwrap();
    let cyn_row = participants.iter().find(|p| p.id == cyn).unwrap();
    assert_eq!(cyn_row.survival_state, SurvivalState::Active);
    assert_eq!(cyn_row.invite_status, InviteStatus::Pending);
}

/// Draw source whose pool can be refilled mid-test, to exercise the
/// held-tournament retry path
struct RefillableTargets {
    pool: Mutex<Vec<Target>>,
}

impl RefillableTargets {
    fn empty() -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
        }
    }

    async fn refill(&self, targets: Vec<Target>) {
        *self.pool.lock().await = targets;
    }
}

#[async_trait]
impl TargetDraw for RefillableTargets {
    async fn draw_target(&self, _criteria: &TargetCriteria) -> Result<Target, TargetDrawError> {
        let mut pool = self.pool.lock().await;
        if pool.is_empty() {
            return Err(TargetDrawError::NoEligibleTarget);
        }
        Ok(pool.remove(0))
    }
}

#[tokio::test]
async fn test_failed_target_draw_holds_until_sweep() {
    let targets = Arc::new(RefillableTargets::empty());
    let arena = Arena::with_targets(targets.clone());
    let tournament = arena
        .accepted_tournament(TournamentConfig::blitz(100), &["ann", "bob"], 0)
        .await;

    // The start succeeds even though no round could open
    assert_eq!(
        arena.manager.start(tournament.id).await.unwrap(),
        StartOutcome::Started
    );
    assert_eq!(
        arena
            .manager
            .tournament(tournament.id)
            .await
            .unwrap()
            .status,
        TournamentStatus::Live
    );
    assert!(arena.manager.latest_round(tournament.id).await.unwrap().is_none());

    // Nothing to draw yet: the sweep leaves the hold in place
    assert_eq!(arena.manager.sweep_stalled_tournaments().await.unwrap(), 0);

    targets
        .refill(vec![Target {
            id: 7,
            label: "target-7".to_string(),
        }])
        .await;
    assert_eq!(arena.manager.sweep_stalled_tournaments().await.unwrap(), 1);
    let round = arena.open_round(tournament.id).await;
    assert_eq!(round.round_number, 1);
    assert_eq!(round.target_id, 7);
}

#[tokio::test]
async fn test_join_deadline_sweep_starts_due_lobbies() {
    let arena = Arena::new();
    let deadline = Utc::now() - Duration::seconds(5);
    let config = TournamentConfig::standard(100).with_deadline(deadline);
    let tournament = arena
        .accepted_tournament(config, &["ann", "bob"], 0)
        .await;

    let started = arena.manager.sweep_join_deadlines(Utc::now()).await.unwrap();
    assert_eq!(started, 1);
    assert_eq!(
        arena
            .manager
            .tournament(tournament.id)
            .await
            .unwrap()
            .status,
        TournamentStatus::Live
    );
    // A second sweep finds nothing to do
    assert_eq!(arena.manager.sweep_join_deadlines(Utc::now()).await.unwrap(), 0);
}

/// Ledger whose credits can be switched off, to simulate an outage at
/// payout time
struct OutageLedger {
    inner: MemoryLedger,
    credits_down: AtomicBool,
}

impl OutageLedger {
    fn new() -> Self {
        Self {
            inner: MemoryLedger::new(),
            credits_down: AtomicBool::new(false),
        }
    }

    fn set_credits_down(&self, down: bool) {
        self.credits_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for OutageLedger {
    async fn debit(&self, account: AccountId, amount: i64, key: &str) -> LedgerResult<()> {
        self.inner.debit(account, amount, key).await
    }

    async fn credit(&self, account: AccountId, amount: i64, key: &str) -> LedgerResult<()> {
        if self.credits_down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("credits offline".to_string()));
        }
        self.inner.credit(account, amount, key).await
    }

    async fn balance(&self, account: AccountId) -> LedgerResult<i64> {
        self.inner.balance(account).await
    }
}

#[tokio::test]
async fn test_interrupted_payout_is_redriven_by_sweep() {
    let ledger = Arc::new(OutageLedger::new());
    ledger.inner.fund(101, FUNDS).await;
    ledger.inner.fund(102, FUNDS).await;
    let recorder = Arc::new(MemoryRecorder::new());
    let manager = TournamentManager::new(
        Arc::new(MemoryStore::new()),
        ledger.clone(),
        Arc::new(RotatingTargets::numbered(4)),
        recorder.clone(),
        Arc::new(knockout_arena::NullNotifier),
    );

    let tournament = manager
        .create(
            Invitee::new(101, "ann"),
            TournamentConfig::blitz(100),
            vec![Invitee::new(102, "bob")],
            0,
        )
        .await
        .unwrap();
    let participants = manager.participants(tournament.id).await.unwrap();
    for p in &participants {
        manager.accept_invite(tournament.id, p.id).await.unwrap();
    }
    manager.start(tournament.id).await.unwrap();
    let round = manager.latest_round(tournament.id).await.unwrap().unwrap();
    let ann = participants
        .iter()
        .find(|p| p.display_name == "ann")
        .unwrap()
        .id;
    recorder.record(round.id, ann, 10).await;
    manager.submit_entry(round.id, ann).await.unwrap();

    // The ledger goes down before the timeout close reaches the payout
    ledger.set_credits_down(true);
    let late = round.ends_at + Duration::seconds(1);
    assert!(manager.close_round(round.id, late).await.is_err());

    // No half-finished state: the tournament stays live and unpaid
    // rather than finished and unpaid
    let held = manager.tournament(tournament.id).await.unwrap();
    assert_eq!(held.status, TournamentStatus::Live);
    assert!(held.winner.is_none());
    assert!(!manager
        .latest_round(tournament.id)
        .await
        .unwrap()
        .unwrap()
        .is_open());
    assert_eq!(ledger.balance(101).await.unwrap(), FUNDS - 100);

    // A sweep during the outage keeps holding
    assert_eq!(manager.sweep_stalled_tournaments().await.unwrap(), 0);

    // Once the ledger recovers, the sweep re-drives the finalize
    ledger.set_credits_down(false);
    assert_eq!(manager.sweep_stalled_tournaments().await.unwrap(), 1);
    let finished = manager.tournament(tournament.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Finished);
    assert_eq!(finished.winner, Some(ann));
    assert_eq!(ledger.balance(101).await.unwrap(), FUNDS - 100 + 200);

    // A redundant sweep finds nothing left to re-drive
    assert_eq!(manager.sweep_stalled_tournaments().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_round_sweep_closes_and_advances() {
    let arena = Arena::new();
    let (tournament, round) = arena
        .running_tournament(TournamentConfig::blitz(100), &["ann", "bob"], 0)
        .await;

    arena.submit(tournament.id, &round, "ann", 10).await;
    let later = round.ends_at + Duration::seconds(1);
    let closed = arena.manager.sweep_expired_rounds(later).await.unwrap();
    assert_eq!(closed, 1);

    // bob was zero-filled and eliminated; ann wins
    let finished = arena.manager.tournament(tournament.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Finished);
    let ann = arena.participant_id(tournament.id, "ann").await;
    assert_eq!(finished.winner, Some(ann));
}
