//! SQLite-backed contest store
//!
//! Single connection behind a tokio mutex, WAL mode so API reads stay cheap
//! while sync cycles write. Settlement is one immediate transaction: the
//! status flip, the winner row and the balance credit land together or not
//! at all.

use crate::models::{
    ClipMetrics, Contest, ContestStatus, ContestWinner, Platform, PlatformCredential, Profile,
    ReviewStatus, SettlementOutcome, Submission, SyncCandidate, WinCondition, WinMetric,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, TransactionBehavior};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

const SCHEMA_SQL: &str = r#"
-- A second engine instance must wait for the write lock, not error out
PRAGMA busy_timeout = 5000;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    balance_usd REAL NOT NULL DEFAULT 0 CHECK (balance_usd >= 0),
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS contests (
    id TEXT PRIMARY KEY,
    creator_id TEXT NOT NULL,
    title TEXT NOT NULL,
    prize_pool_usd REAL NOT NULL,
    status TEXT NOT NULL,
    win_metric TEXT NOT NULL,
    win_target INTEGER NOT NULL,
    end_date INTEGER,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_contests_status ON contests(status);

CREATE TABLE IF NOT EXISTS submissions (
    id TEXT PRIMARY KEY,
    contest_id TEXT NOT NULL,
    profile_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    content_url TEXT NOT NULL,
    view_count INTEGER,
    like_count INTEGER,
    comment_count INTEGER,
    share_count INTEGER,
    last_synced_at INTEGER,
    review_status TEXT NOT NULL DEFAULT 'pending_ownership_check',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_submissions_contest
    ON submissions(contest_id, review_status);

-- One winner slot per (contest, rank); the unique index is the last line
-- of defense against double settlement.
CREATE TABLE IF NOT EXISTS contest_winners (
    id TEXT PRIMARY KEY,
    contest_id TEXT NOT NULL,
    profile_id TEXT NOT NULL,
    submission_id TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 1,
    prize_usd REAL NOT NULL,
    awarded_at INTEGER NOT NULL,
    UNIQUE (contest_id, rank)
);

-- Singleton row per platform, guarded by compare-and-swap on updated_at
CREATE TABLE IF NOT EXISTS platform_credentials (
    platform TEXT PRIMARY KEY,
    access_token TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

#[derive(Clone)]
pub struct ContestStore {
    conn: Arc<Mutex<Connection>>,
}

impl ContestStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        Self::init(conn)
    }

    /// In-memory store for tests
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply contest schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ========== Sync work set ==========

    /// Approved submissions in active contests, joined with the contest
    /// fields the evaluator needs. Rows with unrecognized platform or
    /// metric values are logged and skipped rather than failing the cycle.
    pub async fn select_work_set(&self) -> Result<Vec<SyncCandidate>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT s.id, s.contest_id, s.profile_id, s.platform, s.content_url, \
                    c.win_metric, c.win_target, c.prize_pool_usd \
             FROM submissions s \
             JOIN contests c ON c.id = s.contest_id \
             WHERE c.status = 'active' AND s.review_status = 'approved' \
             ORDER BY s.created_at ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, u64>(6)?,
                row.get::<_, f64>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for r in rows {
            let (submission_id, contest_id, profile_id, platform, content_url, metric, target, prize) =
                r?;
            let Some(platform) = Platform::parse(&platform) else {
                warn!(
                    "⚠️ Submission {} has unknown platform '{}', skipping",
                    submission_id, platform
                );
                continue;
            };
            let Some(metric) = WinMetric::parse(&metric) else {
                warn!(
                    "⚠️ Contest {} has unknown win metric '{}', skipping",
                    contest_id, metric
                );
                continue;
            };
            out.push(SyncCandidate {
                submission_id,
                contest_id,
                profile_id,
                platform,
                content_url,
                win_condition: WinCondition { metric, target },
                prize_pool_usd: prize,
            });
        }

        Ok(out)
    }

    /// Overwrite a submission's engagement counters with the latest fetched
    /// snapshot. Counters the platform did not report are stored as NULL.
    pub async fn record_metrics(
        &self,
        submission_id: &str,
        metrics: &ClipMetrics,
        synced_at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE submissions SET \
                view_count = ?2, like_count = ?3, comment_count = ?4, share_count = ?5, \
                last_synced_at = ?6 \
             WHERE id = ?1",
            params![
                submission_id,
                metrics.views,
                metrics.likes,
                metrics.comments,
                metrics.shares,
                synced_at
            ],
        )?;
        if updated == 0 {
            warn!(
                "⚠️ record_metrics: submission {} no longer exists",
                submission_id
            );
        }
        Ok(())
    }

    // ========== Settlement ==========

    /// Settle a contest for a winning submission. The conditional status
    /// flip is the gate: exactly one caller moves the contest off `active`,
    /// everyone else gets `AlreadySettled` (or `NotSettleable` if the
    /// contest left the active state some other way). The winner row and
    /// the balance credit commit atomically with the flip.
    pub async fn settle_contest(
        &self,
        contest_id: &str,
        profile_id: &str,
        submission_id: &str,
        now: i64,
    ) -> Result<SettlementOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let flipped = tx.execute(
            "UPDATE contests SET status = 'completed', completed_at = ?2 \
             WHERE id = ?1 AND status = 'active'",
            params![contest_id, now],
        )?;

        if flipped == 0 {
            let mut stmt = tx.prepare_cached("SELECT status FROM contests WHERE id = ?1")?;
            let mut rows = stmt.query(params![contest_id])?;
            let Some(row) = rows.next()? else {
                return Err(anyhow!("Contest {} does not exist", contest_id));
            };
            let status_str: String = row.get(0)?;
            if status_str == "completed" {
                return Ok(SettlementOutcome::AlreadySettled);
            }
            let status = ContestStatus::parse(&status_str)
                .ok_or_else(|| anyhow!("Contest {} has unknown status '{}'", contest_id, status_str))?;
            return Ok(SettlementOutcome::NotSettleable(status));
        }

        let prize_usd: f64 = {
            let mut stmt =
                tx.prepare_cached("SELECT prize_pool_usd FROM contests WHERE id = ?1")?;
            let mut rows = stmt.query(params![contest_id])?;
            let Some(row) = rows.next()? else {
                return Err(anyhow!("Contest {} vanished mid-settlement", contest_id));
            };
            row.get(0)?
        };

        let winner = ContestWinner {
            id: uuid::Uuid::new_v4().to_string(),
            contest_id: contest_id.to_string(),
            profile_id: profile_id.to_string(),
            submission_id: submission_id.to_string(),
            rank: 1,
            prize_usd,
            awarded_at: now,
        };

        tx.execute(
            "INSERT INTO contest_winners \
             (id, contest_id, profile_id, submission_id, rank, prize_usd, awarded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &winner.id,
                &winner.contest_id,
                &winner.profile_id,
                &winner.submission_id,
                winner.rank,
                winner.prize_usd,
                winner.awarded_at,
            ],
        )?;

        // Relative credit, never a read-modify-write from the app side
        let credited = tx.execute(
            "UPDATE profiles SET balance_usd = balance_usd + ?2, updated_at = ?3 WHERE id = ?1",
            params![profile_id, prize_usd, now],
        )?;
        if credited == 0 {
            return Err(anyhow!(
                "Winner profile {} does not exist, settlement rolled back",
                profile_id
            ));
        }

        tx.commit()
            .with_context(|| format!("Failed to commit settlement for contest {}", contest_id))?;

        Ok(SettlementOutcome::Settled(winner))
    }

    /// Flip active contests whose end date has passed without a winner
    pub async fn expire_overdue_contests(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        let expired = conn.execute(
            "UPDATE contests SET status = 'expired' \
             WHERE status = 'active' AND end_date IS NOT NULL AND end_date < ?1",
            params![now],
        )?;
        Ok(expired)
    }

    // ========== Platform credentials ==========

    pub async fn get_credential(&self, platform: Platform) -> Result<Option<PlatformCredential>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT access_token, updated_at FROM platform_credentials WHERE platform = ?1",
        )?;
        let mut rows = stmt.query(params![platform.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(PlatformCredential {
            platform,
            access_token: row.get(0)?,
            updated_at: row.get(1)?,
        }))
    }

    /// Compare-and-swap write of a platform credential. The write only
    /// lands if the stored `updated_at` still matches `expected_updated_at`
    /// (`None` when no row should exist yet). Returns false when the swap
    /// lost, in which case the caller should re-read and adopt the other
    /// writer's token.
    pub async fn put_credential_cas(
        &self,
        platform: Platform,
        access_token: &str,
        expected_updated_at: Option<i64>,
        now: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let written = match expected_updated_at {
            Some(expected) => conn.execute(
                "UPDATE platform_credentials SET access_token = ?2, updated_at = ?3 \
                 WHERE platform = ?1 AND updated_at = ?4",
                params![platform.as_str(), access_token, now, expected],
            )?,
            None => conn.execute(
                "INSERT OR IGNORE INTO platform_credentials (platform, access_token, updated_at) \
                 VALUES (?1, ?2, ?3)",
                params![platform.as_str(), access_token, now],
            )?,
        };
        Ok(written > 0)
    }

    /// Unconditional credential write, used for seeding and manual rotation
    pub async fn put_credential(
        &self,
        platform: Platform,
        access_token: &str,
        updated_at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO platform_credentials (platform, access_token, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(platform) DO UPDATE SET \
                access_token = excluded.access_token, \
                updated_at = excluded.updated_at",
            params![platform.as_str(), access_token, updated_at],
        )?;
        Ok(())
    }

    // ========== Records ==========

    pub async fn insert_profile(&self, profile: &Profile) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO profiles (id, display_name, balance_usd, updated_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &profile.id,
                &profile.display_name,
                profile.balance_usd,
                profile.updated_at
            ],
        )?;
        Ok(())
    }

    pub async fn insert_contest(&self, contest: &Contest) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO contests \
             (id, creator_id, title, prize_pool_usd, status, win_metric, win_target, end_date, created_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &contest.id,
                &contest.creator_id,
                &contest.title,
                contest.prize_pool_usd,
                contest.status.as_str(),
                contest.win_condition.metric.as_str(),
                contest.win_condition.target,
                contest.end_date,
                contest.created_at,
                contest.completed_at,
            ],
        )?;
        Ok(())
    }

    pub async fn insert_submission(&self, sub: &Submission) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO submissions \
             (id, contest_id, profile_id, platform, content_url, view_count, like_count, comment_count, share_count, last_synced_at, review_status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &sub.id,
                &sub.contest_id,
                &sub.profile_id,
                sub.platform.as_str(),
                &sub.content_url,
                sub.metrics.views,
                sub.metrics.likes,
                sub.metrics.comments,
                sub.metrics.shares,
                sub.last_synced_at,
                sub.review_status.as_str(),
                sub.created_at,
            ],
        )?;
        Ok(())
    }

    pub async fn get_contest(&self, contest_id: &str) -> Result<Option<Contest>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, creator_id, title, prize_pool_usd, status, win_metric, win_target, \
                    end_date, created_at, completed_at \
             FROM contests WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![contest_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        contest_from_row(row).map(Some)
    }

    pub async fn get_submission(&self, submission_id: &str) -> Result<Option<Submission>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, contest_id, profile_id, platform, content_url, view_count, like_count, \
                    comment_count, share_count, last_synced_at, review_status, created_at \
             FROM submissions WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![submission_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        submission_from_row(row).map(Some)
    }

    pub async fn list_submissions(&self, contest_id: &str) -> Result<Vec<Submission>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, contest_id, profile_id, platform, content_url, view_count, like_count, \
                    comment_count, share_count, last_synced_at, review_status, created_at \
             FROM submissions WHERE contest_id = ?1 ORDER BY created_at ASC",
        )?;
        let mut rows = stmt.query(params![contest_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(submission_from_row(row)?);
        }
        Ok(out)
    }

    pub async fn winner_for_contest(&self, contest_id: &str) -> Result<Option<ContestWinner>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, contest_id, profile_id, submission_id, rank, prize_usd, awarded_at \
             FROM contest_winners WHERE contest_id = ?1 ORDER BY rank ASC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![contest_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(ContestWinner {
            id: row.get(0)?,
            contest_id: row.get(1)?,
            profile_id: row.get(2)?,
            submission_id: row.get(3)?,
            rank: row.get(4)?,
            prize_usd: row.get(5)?,
            awarded_at: row.get(6)?,
        }))
    }

    pub async fn get_balance(&self, profile_id: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT balance_usd FROM profiles WHERE id = ?1")?;
        let mut rows = stmt.query(params![profile_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(row.get(0)?))
    }

    pub async fn set_review_status(
        &self,
        submission_id: &str,
        status: ReviewStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE submissions SET review_status = ?2 WHERE id = ?1",
            params![submission_id, status.as_str()],
        )?;
        Ok(updated > 0)
    }

    pub async fn set_contest_status(
        &self,
        contest_id: &str,
        status: ContestStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE contests SET status = ?2 WHERE id = ?1",
            params![contest_id, status.as_str()],
        )?;
        Ok(updated > 0)
    }
}

fn contest_from_row(row: &rusqlite::Row<'_>) -> Result<Contest> {
    let status_str: String = row.get(4)?;
    let metric_str: String = row.get(5)?;
    let status = ContestStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("Unknown contest status '{}'", status_str))?;
    let metric = WinMetric::parse(&metric_str)
        .ok_or_else(|| anyhow!("Unknown win metric '{}'", metric_str))?;
    Ok(Contest {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        title: row.get(2)?,
        prize_pool_usd: row.get(3)?,
        status,
        win_condition: WinCondition {
            metric,
            target: row.get(6)?,
        },
        end_date: row.get(7)?,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

fn submission_from_row(row: &rusqlite::Row<'_>) -> Result<Submission> {
    let platform_str: String = row.get(3)?;
    let review_str: String = row.get(10)?;
    let platform = Platform::parse(&platform_str)
        .ok_or_else(|| anyhow!("Unknown platform '{}'", platform_str))?;
    let review_status = ReviewStatus::parse(&review_str)
        .ok_or_else(|| anyhow!("Unknown review status '{}'", review_str))?;
    Ok(Submission {
        id: row.get(0)?,
        contest_id: row.get(1)?,
        profile_id: row.get(2)?,
        platform,
        content_url: row.get(4)?,
        metrics: ClipMetrics {
            views: row.get(5)?,
            likes: row.get(6)?,
            comments: row.get(7)?,
            shares: row.get(8)?,
        },
        last_synced_at: row.get(9)?,
        review_status,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ContestStore {
        ContestStore::new_in_memory().unwrap()
    }

    fn test_profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            display_name: format!("user-{}", id),
            balance_usd: 0.0,
            updated_at: 1_700_000_000,
        }
    }

    fn test_contest(id: &str, status: ContestStatus, target: u64) -> Contest {
        Contest {
            id: id.to_string(),
            creator_id: "creator-1".to_string(),
            title: format!("Contest {}", id),
            prize_pool_usd: 500.0,
            status,
            win_condition: WinCondition {
                metric: WinMetric::ViewCount,
                target,
            },
            end_date: None,
            created_at: 1_700_000_000,
            completed_at: None,
        }
    }

    fn test_submission(id: &str, contest_id: &str, profile_id: &str, review: ReviewStatus) -> Submission {
        Submission {
            id: id.to_string(),
            contest_id: contest_id.to_string(),
            profile_id: profile_id.to_string(),
            platform: Platform::Youtube,
            content_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            metrics: ClipMetrics::default(),
            last_synced_at: None,
            review_status: review,
            created_at: 1_700_000_000,
        }
    }

    async fn seed_settleable(store: &ContestStore) {
        store.insert_profile(&test_profile("creator-1")).await.unwrap();
        store.insert_profile(&test_profile("alice")).await.unwrap();
        store
            .insert_contest(&test_contest("c1", ContestStatus::Active, 1000))
            .await
            .unwrap();
        store
            .insert_submission(&test_submission("s1", "c1", "alice", ReviewStatus::Approved))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_work_set_filters_status() {
        let store = test_store();
        store.insert_profile(&test_profile("creator-1")).await.unwrap();
        store.insert_profile(&test_profile("alice")).await.unwrap();
        store
            .insert_contest(&test_contest("active", ContestStatus::Active, 100))
            .await
            .unwrap();
        store
            .insert_contest(&test_contest("unpaid", ContestStatus::PendingPayment, 100))
            .await
            .unwrap();

        store
            .insert_submission(&test_submission("approved-active", "active", "alice", ReviewStatus::Approved))
            .await
            .unwrap();
        store
            .insert_submission(&test_submission(
                "pending-active",
                "active",
                "alice",
                ReviewStatus::PendingOwnershipCheck,
            ))
            .await
            .unwrap();
        store
            .insert_submission(&test_submission("approved-unpaid", "unpaid", "alice", ReviewStatus::Approved))
            .await
            .unwrap();

        let work = store.select_work_set().await.unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].submission_id, "approved-active");
        assert_eq!(work[0].win_condition.target, 100);
    }

    #[tokio::test]
    async fn test_record_metrics_is_last_writer_wins() {
        let store = test_store();
        seed_settleable(&store).await;

        let first = ClipMetrics {
            views: Some(10),
            likes: Some(2),
            comments: Some(1),
            shares: Some(1),
        };
        store.record_metrics("s1", &first, 100).await.unwrap();

        // Second snapshot is missing shares; the stored value must go back
        // to NULL, not keep the old counter
        let second = ClipMetrics {
            views: Some(20),
            likes: Some(3),
            comments: Some(2),
            shares: None,
        };
        store.record_metrics("s1", &second, 200).await.unwrap();

        let sub = store.get_submission("s1").await.unwrap().unwrap();
        assert_eq!(sub.metrics.views, Some(20));
        assert_eq!(sub.metrics.shares, None);
        assert_eq!(sub.last_synced_at, Some(200));
    }

    #[tokio::test]
    async fn test_settle_contest_pays_once() {
        let store = test_store();
        seed_settleable(&store).await;

        let outcome = store.settle_contest("c1", "alice", "s1", 1_700_000_100).await.unwrap();
        let winner = match outcome {
            SettlementOutcome::Settled(w) => w,
            other => panic!("expected Settled, got {:?}", other),
        };
        assert_eq!(winner.rank, 1);
        assert_eq!(winner.prize_usd, 500.0);

        let contest = store.get_contest("c1").await.unwrap().unwrap();
        assert_eq!(contest.status, ContestStatus::Completed);
        assert_eq!(contest.completed_at, Some(1_700_000_100));

        let balance = store.get_balance("alice").await.unwrap().unwrap();
        assert_eq!(balance, 500.0);

        // Repeat attempts lose the conditional flip and must not pay again
        for now in [1_700_000_200, 1_700_000_300] {
            let again = store.settle_contest("c1", "alice", "s1", now).await.unwrap();
            assert!(matches!(again, SettlementOutcome::AlreadySettled));
        }
        let balance = store.get_balance("alice").await.unwrap().unwrap();
        assert_eq!(balance, 500.0);
        let contest = store.get_contest("c1").await.unwrap().unwrap();
        assert_eq!(contest.completed_at, Some(1_700_000_100));
    }

    #[tokio::test]
    async fn test_settle_inactive_contest_is_not_settleable() {
        let store = test_store();
        seed_settleable(&store).await;
        store
            .set_contest_status("c1", ContestStatus::Cancelled)
            .await
            .unwrap();

        let outcome = store.settle_contest("c1", "alice", "s1", 1_700_000_100).await.unwrap();
        assert!(matches!(
            outcome,
            SettlementOutcome::NotSettleable(ContestStatus::Cancelled)
        ));
        assert_eq!(store.get_balance("alice").await.unwrap().unwrap(), 0.0);
        assert!(store.winner_for_contest("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_missing_profile_rolls_back() {
        let store = test_store();
        store.insert_profile(&test_profile("creator-1")).await.unwrap();
        store
            .insert_contest(&test_contest("c1", ContestStatus::Active, 1000))
            .await
            .unwrap();
        store
            .insert_submission(&test_submission("s1", "c1", "ghost", ReviewStatus::Approved))
            .await
            .unwrap();

        let err = store.settle_contest("c1", "ghost", "s1", 1_700_000_100).await;
        assert!(err.is_err());

        // Flip must have rolled back with the failed credit
        let contest = store.get_contest("c1").await.unwrap().unwrap();
        assert_eq!(contest.status, ContestStatus::Active);
        assert!(store.winner_for_contest("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expire_overdue_contests() {
        let store = test_store();
        store.insert_profile(&test_profile("creator-1")).await.unwrap();

        let mut overdue = test_contest("overdue", ContestStatus::Active, 100);
        overdue.end_date = Some(1_000);
        store.insert_contest(&overdue).await.unwrap();

        let mut open_ended = test_contest("open", ContestStatus::Active, 100);
        open_ended.end_date = None;
        store.insert_contest(&open_ended).await.unwrap();

        let mut future = test_contest("future", ContestStatus::Active, 100);
        future.end_date = Some(5_000);
        store.insert_contest(&future).await.unwrap();

        let expired = store.expire_overdue_contests(2_000).await.unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            store.get_contest("overdue").await.unwrap().unwrap().status,
            ContestStatus::Expired
        );
        assert_eq!(
            store.get_contest("open").await.unwrap().unwrap().status,
            ContestStatus::Active
        );
        assert_eq!(
            store.get_contest("future").await.unwrap().unwrap().status,
            ContestStatus::Active
        );
    }

    #[tokio::test]
    async fn test_credential_cas() {
        let store = test_store();

        // First insert only succeeds when no row exists
        assert!(store
            .put_credential_cas(Platform::Youtube, "tok-1", None, 100)
            .await
            .unwrap());
        assert!(!store
            .put_credential_cas(Platform::Youtube, "tok-x", None, 150)
            .await
            .unwrap());

        // Swap with a stale expectation loses
        assert!(!store
            .put_credential_cas(Platform::Youtube, "tok-stale", Some(99), 200)
            .await
            .unwrap());
        let cred = store.get_credential(Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(cred.access_token, "tok-1");
        assert_eq!(cred.updated_at, 100);

        // Swap with the current timestamp wins
        assert!(store
            .put_credential_cas(Platform::Youtube, "tok-2", Some(100), 200)
            .await
            .unwrap());
        let cred = store.get_credential(Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(cred.access_token, "tok-2");
        assert_eq!(cred.updated_at, 200);
    }
}
