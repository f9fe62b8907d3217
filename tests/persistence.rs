use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::params;
use tempfile::TempDir;

use cricket_terminal::ball::Delivery;
use cricket_terminal::demo_feed::random_delivery;
use cricket_terminal::error::{PersistenceError, SessionError};
use cricket_terminal::gateway::{
    MatchId, MatchListing, MatchSnapshot, PersistenceGateway, WriteOp,
};
use cricket_terminal::match_state::{MatchPhase, MatchState};
use cricket_terminal::persist::SqliteGateway;
use cricket_terminal::scorer::Scorer;

fn temp_store() -> (TempDir, SqliteGateway) {
    let dir = tempfile::tempdir().unwrap();
    let gateway = SqliteGateway::open(&dir.path().join("matches.sqlite")).unwrap();
    (dir, gateway)
}

fn assert_stored(gateway: &SqliteGateway, scorer: &Scorer) {
    let snapshot = gateway.load_match(scorer.match_id()).unwrap();
    assert_eq!(&snapshot.state, scorer.state());
    assert_eq!(snapshot.revision, scorer.revision());
}

/// Wraps a real store and fails `apply_writes` while `fail` is set.
struct FlakyGateway {
    inner: SqliteGateway,
    fail: bool,
}

impl PersistenceGateway for FlakyGateway {
    fn create_match(
        &mut self,
        total_overs: u32,
        name: Option<&str>,
    ) -> Result<MatchId, PersistenceError> {
        self.inner.create_match(total_overs, name)
    }

    fn load_match(&self, match_id: &str) -> Result<MatchSnapshot, PersistenceError> {
        self.inner.load_match(match_id)
    }

    fn list_matches(&self) -> Result<Vec<MatchListing>, PersistenceError> {
        self.inner.list_matches()
    }

    fn delete_match(&mut self, match_id: &str) -> Result<(), PersistenceError> {
        self.inner.delete_match(match_id)
    }

    fn revision(&self, match_id: &str) -> Result<u64, PersistenceError> {
        self.inner.revision(match_id)
    }

    fn apply_writes(
        &mut self,
        match_id: &str,
        expected_revision: Option<u64>,
        ops: &[WriteOp],
    ) -> Result<u64, PersistenceError> {
        if self.fail {
            return Err(PersistenceError::storage("apply writes", "connection reset"));
        }
        self.inner.apply_writes(match_id, expected_revision, ops)
    }
}

#[test]
fn stored_state_tracks_every_action() {
    let (_dir, mut gateway) = temp_store();
    let mut scorer = Scorer::create(&mut gateway, 2, Some("Round trip")).unwrap();
    assert_stored(&gateway, &scorer);

    for delivery in [
        Delivery::normal(1),
        Delivery::wide(),
        Delivery::no_ball(2),
        Delivery::normal(4),
        Delivery::wicket(),
        Delivery::normal(0),
        Delivery::normal(6),
        Delivery::normal(2),
    ] {
        scorer.record_delivery(&mut gateway, delivery).unwrap();
        assert_stored(&gateway, &scorer);
    }
    assert_eq!(scorer.state().innings1.current_over, 1);

    // Across the over boundary and back.
    scorer.undo(&mut gateway).unwrap();
    assert_stored(&gateway, &scorer);
    scorer.undo(&mut gateway).unwrap();
    assert_stored(&gateway, &scorer);
    assert_eq!(scorer.state().innings1.overs.len(), 1);
    assert_eq!(scorer.state().innings1.current_ball, 4);

    scorer.record_runs(&mut gateway, 2).unwrap();
    scorer.record_runs(&mut gateway, 3).unwrap();
    assert_stored(&gateway, &scorer);
    assert_eq!(scorer.state().innings1.overs.len(), 2);
}

#[test]
fn stored_state_survives_the_innings_break_and_its_undo() {
    let (_dir, mut gateway) = temp_store();
    let mut scorer = Scorer::create(&mut gateway, 1, None).unwrap();
    for _ in 0..6 {
        scorer.record_runs(&mut gateway, 2).unwrap();
    }
    assert_eq!(scorer.phase(), MatchPhase::Innings1Complete);
    assert_stored(&gateway, &scorer);

    scorer.start_second_innings(&mut gateway).unwrap();
    assert_stored(&gateway, &scorer);
    scorer.record_runs(&mut gateway, 4).unwrap();
    assert_stored(&gateway, &scorer);

    scorer.undo(&mut gateway).unwrap();
    scorer.undo(&mut gateway).unwrap();
    assert_eq!(scorer.phase(), MatchPhase::Innings1Complete);
    assert_stored(&gateway, &scorer);

    // Undoing the ball that closed innings 1 reopens it, target and all.
    scorer.undo(&mut gateway).unwrap();
    assert_eq!(scorer.phase(), MatchPhase::InInnings1);
    assert_eq!(scorer.state().target_runs, None);
    assert_stored(&gateway, &scorer);

    scorer.end_innings(&mut gateway).unwrap();
    assert_eq!(scorer.state().target_runs, Some(11));
    assert_stored(&gateway, &scorer);
}

#[test]
fn finished_match_round_trips_with_its_result() {
    let (_dir, mut gateway) = temp_store();
    let mut scorer = Scorer::create(&mut gateway, 1, None).unwrap();
    for _ in 0..6 {
        scorer.record_runs(&mut gateway, 1).unwrap();
    }
    scorer.start_second_innings(&mut gateway).unwrap();
    scorer.record_wicket(&mut gateway).unwrap();
    scorer.record_runs(&mut gateway, 6).unwrap();
    scorer.record_runs(&mut gateway, 1).unwrap();
    assert_eq!(scorer.phase(), MatchPhase::MatchComplete);
    assert_stored(&gateway, &scorer);

    let snapshot = gateway.load_match(scorer.match_id()).unwrap();
    assert_eq!(snapshot.state.result().unwrap().to_string(), "Team 2 won by 9 wickets");

    scorer.undo(&mut gateway).unwrap();
    assert_stored(&gateway, &scorer);
    assert!(!gateway.load_match(scorer.match_id()).unwrap().state.is_match_complete);
}

#[test]
fn random_sessions_with_undo_stay_in_sync() {
    for seed in 0..4u64 {
        let (_dir, mut gateway) = temp_store();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scorer = Scorer::create(&mut gateway, 3, None).unwrap();
        let mut steps = 0;
        while scorer.phase() != MatchPhase::MatchComplete && steps < 200 {
            steps += 1;
            if scorer.can_undo() && rng.gen_bool(0.2) {
                scorer.undo(&mut gateway).unwrap();
            } else if scorer.phase() == MatchPhase::Innings1Complete {
                scorer.start_second_innings(&mut gateway).unwrap();
            } else {
                scorer
                    .record_delivery(&mut gateway, random_delivery(&mut rng))
                    .unwrap();
            }
            assert_stored(&gateway, &scorer);
        }
    }
}

#[test]
fn failed_write_leaves_session_untouched() {
    let inner = SqliteGateway::open_in_memory().unwrap();
    let mut gateway = FlakyGateway { inner, fail: false };
    let mut scorer = Scorer::create(&mut gateway, 2, None).unwrap();
    scorer.record_runs(&mut gateway, 1).unwrap();

    let before = scorer.state().clone();
    let depth = scorer.history_depth();
    let revision = scorer.revision();

    gateway.fail = true;
    let err = scorer.record_runs(&mut gateway, 4).unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_invariant_violation());
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::Storage { .. })
    ));
    assert_eq!(scorer.state(), &before);
    assert_eq!(scorer.history_depth(), depth);
    assert_eq!(scorer.revision(), revision);

    assert!(scorer.undo(&mut gateway).is_err());
    assert_eq!(scorer.state(), &before);

    // The exact same action goes through once the store is back.
    gateway.fail = false;
    scorer.record_runs(&mut gateway, 4).unwrap();
    assert_eq!(scorer.state().innings1.total_runs, 5);
    assert_eq!(scorer.history_depth(), depth + 1);
    let stored = gateway.load_match(scorer.match_id()).unwrap();
    assert_eq!(&stored.state, scorer.state());
}

#[test]
fn failing_batch_rolls_back_every_op() {
    let (_dir, mut gateway) = temp_store();
    let id = gateway.create_match(2, None).unwrap();
    let ball = Delivery::normal(3);
    let ops = vec![
        WriteOp::AppendDelivery {
            innings: 1,
            over_number: 0,
            delivery: ball,
            updated_over: cricket_terminal::over::Over::from_balls(vec![ball]),
        },
        WriteOp::StartOver {
            innings: 1,
            over_number: 1,
        },
        // Over 1 has no balls, so this one fails.
        WriteOp::DeleteLastDelivery {
            innings: 1,
            over_number: 1,
        },
    ];
    let err = gateway.apply_writes(&id, Some(0), &ops).unwrap_err();
    assert!(matches!(err, PersistenceError::Malformed { .. }));

    let snapshot = gateway.load_match(&id).unwrap();
    assert_eq!(snapshot.revision, 0);
    assert_eq!(snapshot.state, MatchState::start(2).unwrap());
    let deliveries: i64 = gateway
        .connection()
        .query_row("SELECT COUNT(*) FROM deliveries", [], |row| row.get(0))
        .unwrap();
    assert_eq!(deliveries, 0);
}

#[test]
fn second_writer_on_a_stale_revision_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches.sqlite");
    let mut first = SqliteGateway::open(&path).unwrap();
    let mut second = SqliteGateway::open(&path).unwrap();

    let mut scorer_a = Scorer::create(&mut first, 2, Some("Shared")).unwrap();
    let mut scorer_b = Scorer::resume(&second, scorer_a.match_id()).unwrap();

    scorer_a.record_runs(&mut first, 4).unwrap();
    let before = scorer_b.state().clone();
    let err = scorer_b.record_runs(&mut second, 1).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::Conflict {
            expected: 0,
            found: 1,
            ..
        })
    ));
    assert!(!err.is_retryable());
    assert_eq!(scorer_b.state(), &before);
    assert_eq!(scorer_b.revision(), 0);
    assert!(!scorer_b.can_undo());

    // The store still holds exactly the first writer's match.
    assert_stored(&second, &scorer_a);
    assert_eq!(scorer_a.state().innings1.total_runs, 4);

    // Picking the match up again lets the second writer carry on.
    let mut scorer_b = Scorer::resume(&second, scorer_a.match_id()).unwrap();
    scorer_b.record_runs(&mut second, 1).unwrap();
    assert_stored(&first, &scorer_b);
    assert_eq!(scorer_b.state().innings1.total_runs, 5);
    let err = scorer_a.undo(&mut first).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persistence(PersistenceError::Conflict { .. })
    ));
    assert_eq!(first.load_match(scorer_a.match_id()).unwrap().state.innings1.total_runs, 5);
}

#[test]
fn single_op_helpers_bump_the_revision() {
    let (_dir, mut gateway) = temp_store();
    let id = gateway.create_match(3, None).unwrap();
    let ball = Delivery::normal(2);
    gateway
        .append_delivery(&id, 1, 0, &ball, &cricket_terminal::over::Over::from_balls(vec![ball]))
        .unwrap();
    gateway.start_over(&id, 1, 1).unwrap();
    gateway.discard_over(&id, 1, 1).unwrap();
    gateway.delete_last_delivery(&id, 1, 0).unwrap();
    assert_eq!(gateway.revision(&id).unwrap(), 4);

    let err = gateway.discard_over(&id, 1, 7).unwrap_err();
    assert!(matches!(err, PersistenceError::Malformed { what: "over", .. }));
    assert_eq!(gateway.revision(&id).unwrap(), 4);
}

#[test]
fn over_totals_that_disagree_are_malformed() {
    let (_dir, mut gateway) = temp_store();
    let mut scorer = Scorer::create(&mut gateway, 2, None).unwrap();
    scorer.record_runs(&mut gateway, 4).unwrap();
    gateway
        .connection()
        .execute(
            "UPDATE overs SET total_runs = 9 WHERE match_id = ?1",
            params![scorer.match_id()],
        )
        .unwrap();
    let err = gateway.load_match(scorer.match_id()).unwrap_err();
    assert!(matches!(err, PersistenceError::Malformed { what: "over", .. }));
}

#[test]
fn gaps_in_over_numbers_are_malformed() {
    let (_dir, mut gateway) = temp_store();
    let id = gateway.create_match(5, None).unwrap();
    gateway
        .connection()
        .execute(
            "INSERT INTO overs (match_id, innings, over_number) VALUES (?1, 1, 2)",
            params![id],
        )
        .unwrap();
    let err = gateway.load_match(&id).unwrap_err();
    assert!(matches!(err, PersistenceError::Malformed { what: "over", .. }));
}

#[test]
fn impossible_match_rows_are_malformed() {
    let (_dir, mut gateway) = temp_store();
    let id = gateway.create_match(5, None).unwrap();
    gateway
        .connection()
        .execute(
            "UPDATE matches SET current_innings = 3 WHERE id = ?1",
            params![id],
        )
        .unwrap();
    let err = gateway.load_match(&id).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Malformed {
            what: "innings number",
            ..
        }
    ));

    let other = gateway.create_match(5, None).unwrap();
    gateway
        .connection()
        .execute(
            "UPDATE matches SET innings1_wickets = 11 WHERE id = ?1",
            params![other],
        )
        .unwrap();
    let err = gateway.load_match(&other).unwrap_err();
    assert!(matches!(err, PersistenceError::Malformed { what: "match", .. }));
}

#[test]
fn matches_outlive_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("matches.sqlite");
    let (id, state) = {
        let mut gateway = SqliteGateway::open(&path).unwrap();
        let mut scorer = Scorer::create(&mut gateway, 4, Some("Reopen")).unwrap();
        scorer.record_runs(&mut gateway, 3).unwrap();
        scorer.record_wide(&mut gateway).unwrap();
        (scorer.match_id().to_string(), scorer.state().clone())
    };

    let mut gateway = SqliteGateway::open(&path).unwrap();
    let snapshot = gateway.load_match(&id).unwrap();
    assert_eq!(snapshot.state, state);
    assert_eq!(snapshot.name.as_deref(), Some("Reopen"));
    assert_eq!(snapshot.revision, 2);

    let mut resumed = Scorer::resume(&gateway, &id).unwrap();
    assert!(!resumed.can_undo());
    resumed.record_runs(&mut gateway, 1).unwrap();
    assert_eq!(gateway.load_match(&id).unwrap().state.innings1.total_runs, 5);
}

#[test]
fn listing_is_newest_first_with_scores() {
    let (_dir, mut gateway) = temp_store();
    let first = gateway.create_match(2, Some("Opener")).unwrap();
    let mut scorer = Scorer::create(&mut gateway, 1, None).unwrap();
    for _ in 0..6 {
        scorer.record_runs(&mut gateway, 1).unwrap();
    }
    scorer.start_second_innings(&mut gateway).unwrap();
    scorer.record_wicket(&mut gateway).unwrap();

    let listing = gateway.list_matches().unwrap();
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].match_id, scorer.match_id());
    assert_eq!(listing[1].match_id, first);
    assert_eq!(listing[1].display_name(), "Opener");
    assert_eq!(listing[0].current_innings, 2);
    assert_eq!(listing[0].score_line(), "6/0 v 0/1");
    assert!(!listing[0].is_match_complete);
}
