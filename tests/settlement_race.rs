//! Integration tests for concurrent contest settlement
//!
//! These tests open several store instances against the same SQLite file,
//! the way separate engine processes would, and verify that no matter how
//! many writers confirm a win at the same moment, exactly one settlement
//! lands: one winner row, one prize credit, one status flip.

use cliparena_backend::models::{
    ClipMetrics, Contest, ContestStatus, Platform, Profile, ReviewStatus, SettlementOutcome,
    Submission, WinCondition, WinMetric,
};
use cliparena_backend::store::ContestStore;
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;
const PRIZE: f64 = 500.0;

fn profile(id: &str) -> Profile {
    Profile {
        id: id.to_string(),
        display_name: format!("Creator {}", id),
        balance_usd: 10.0,
        updated_at: NOW,
    }
}

fn contest(id: &str, end_date: Option<i64>) -> Contest {
    Contest {
        id: id.to_string(),
        creator_id: "host".to_string(),
        title: "Most viewed clip".to_string(),
        prize_pool_usd: PRIZE,
        status: ContestStatus::Active,
        win_condition: WinCondition {
            metric: WinMetric::ViewCount,
            target: 1_000,
        },
        end_date,
        created_at: NOW - 86_400,
        completed_at: None,
    }
}

fn submission(id: &str, contest_id: &str, profile_id: &str) -> Submission {
    Submission {
        id: id.to_string(),
        contest_id: contest_id.to_string(),
        profile_id: profile_id.to_string(),
        platform: Platform::Youtube,
        content_url: format!("https://youtu.be/{}", id),
        metrics: ClipMetrics::default(),
        last_synced_at: None,
        review_status: ReviewStatus::Approved,
        created_at: NOW - 3_600,
    }
}

/// Seed one active contest with `entrants` approved submissions, each from
/// its own profile. Returns the paths of the temp dir and database file.
async fn seed_database(entrants: usize) -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("contests.db")
        .to_str()
        .expect("utf-8 path")
        .to_string();

    let store = ContestStore::new(&path).expect("open store");
    store.insert_profile(&profile("host")).await.expect("host");
    store
        .insert_contest(&contest("race-contest", None))
        .await
        .expect("contest");
    for i in 0..entrants {
        let user = format!("user-{}", i);
        store.insert_profile(&profile(&user)).await.expect("profile");
        store
            .insert_submission(&submission(&format!("sub-{}", i), "race-contest", &user))
            .await
            .expect("submission");
    }
    (dir, path)
}

#[tokio::test]
async fn concurrent_settlement_pays_exactly_once() {
    let entrants = 8;
    let (_dir, path) = seed_database(entrants).await;

    // One connection per writer, opened up front so the race is purely
    // between settlement transactions
    let stores: Vec<ContestStore> = (0..entrants)
        .map(|_| ContestStore::new(&path).expect("open writer store"))
        .collect();

    let mut handles = Vec::new();
    for (i, store) in stores.into_iter().enumerate() {
        handles.push(tokio::spawn(async move {
            store
                .settle_contest(
                    "race-contest",
                    &format!("user-{}", i),
                    &format!("sub-{}", i),
                    NOW,
                )
                .await
        }));
    }

    let mut settled = 0;
    let mut already_settled = 0;
    let mut winner_profile = None;
    for handle in handles {
        match handle.await.expect("task panicked").expect("settle failed") {
            SettlementOutcome::Settled(winner) => {
                settled += 1;
                assert_eq!(winner.contest_id, "race-contest");
                assert_eq!(winner.rank, 1);
                assert_eq!(winner.prize_usd, PRIZE);
                winner_profile = Some(winner.profile_id);
            }
            SettlementOutcome::AlreadySettled => already_settled += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(settled, 1, "exactly one writer may win the flip");
    assert_eq!(already_settled, entrants - 1);

    // Verify the durable state through a fresh connection
    let store = ContestStore::new(&path).expect("open verifier store");
    let contest = store
        .get_contest("race-contest")
        .await
        .expect("get contest")
        .expect("contest exists");
    assert_eq!(contest.status, ContestStatus::Completed);
    assert_eq!(contest.completed_at, Some(NOW));

    let winner = store
        .winner_for_contest("race-contest")
        .await
        .expect("winner query")
        .expect("winner row recorded");
    let winner_profile = winner_profile.expect("settled outcome carries the winner");
    assert_eq!(winner.profile_id, winner_profile);

    // The prize landed once: winner at 10 + 500, everyone else untouched
    for i in 0..entrants {
        let user = format!("user-{}", i);
        let balance = store
            .get_balance(&user)
            .await
            .expect("balance query")
            .expect("profile exists");
        if user == winner_profile {
            assert_eq!(balance, 10.0 + PRIZE);
        } else {
            assert_eq!(balance, 10.0);
        }
    }
}

#[tokio::test]
async fn settlement_is_idempotent_across_restart() {
    let (_dir, path) = seed_database(1).await;

    let first = ContestStore::new(&path).expect("open store");
    let outcome = first
        .settle_contest("race-contest", "user-0", "sub-0", NOW)
        .await
        .expect("first settle");
    assert!(matches!(outcome, SettlementOutcome::Settled(_)));
    drop(first);

    // A restarted engine re-confirms the same win and must not pay again
    let second = ContestStore::new(&path).expect("reopen store");
    let outcome = second
        .settle_contest("race-contest", "user-0", "sub-0", NOW + 300)
        .await
        .expect("second settle");
    assert!(matches!(outcome, SettlementOutcome::AlreadySettled));

    let balance = second
        .get_balance("user-0")
        .await
        .expect("balance query")
        .expect("profile exists");
    assert_eq!(balance, 10.0 + PRIZE);
}

#[tokio::test]
async fn expiry_and_settlement_agree_on_one_outcome() {
    let (_dir, path) = seed_database(1).await;

    // Push the contest past its deadline so both writes are in play
    let setup = ContestStore::new(&path).expect("open store");
    setup
        .insert_contest(&contest("overdue", Some(NOW - 60)))
        .await
        .expect("overdue contest");
    setup
        .insert_submission(&submission("late-sub", "overdue", "user-0"))
        .await
        .expect("late submission");

    let settler = ContestStore::new(&path).expect("settler store");
    let sweeper = ContestStore::new(&path).expect("sweeper store");

    let settle_task = tokio::spawn(async move {
        settler
            .settle_contest("overdue", "user-0", "late-sub", NOW)
            .await
    });
    let expire_task = tokio::spawn(async move { sweeper.expire_overdue_contests(NOW).await });

    let settle_outcome = settle_task
        .await
        .expect("settle task panicked")
        .expect("settle failed");
    expire_task
        .await
        .expect("expire task panicked")
        .expect("expire failed");

    let store = ContestStore::new(&path).expect("verifier store");
    let contest = store
        .get_contest("overdue")
        .await
        .expect("get contest")
        .expect("contest exists");
    let balance = store
        .get_balance("user-0")
        .await
        .expect("balance query")
        .expect("profile exists");

    match settle_outcome {
        SettlementOutcome::Settled(_) => {
            // Settlement won the flip; the sweep must leave it alone
            assert_eq!(contest.status, ContestStatus::Completed);
            assert_eq!(balance, 10.0 + PRIZE);
        }
        SettlementOutcome::NotSettleable(status) => {
            // The sweep got there first; no winner, no payout
            assert_eq!(status, ContestStatus::Expired);
            assert_eq!(contest.status, ContestStatus::Expired);
            assert!(store
                .winner_for_contest("overdue")
                .await
                .expect("winner query")
                .is_none());
            assert_eq!(balance, 10.0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
