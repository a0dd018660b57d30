use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platforms we sync engagement metrics from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Youtube,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Some(Platform::Youtube),
            "tiktok" => Some(Platform::Tiktok),
            _ => None,
        }
    }
}

/// Moderation state of a submission. Clips pass an ownership check and a
/// relevance check before the engine will touch them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingOwnershipCheck,
    PendingRelevanceCheck,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ReviewStatus::PendingOwnershipCheck => "pending_ownership_check",
            ReviewStatus::PendingRelevanceCheck => "pending_relevance_check",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_ownership_check" => Some(ReviewStatus::PendingOwnershipCheck),
            "pending_relevance_check" => Some(ReviewStatus::PendingRelevanceCheck),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

/// Contest lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    PendingPayment,
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl ContestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ContestStatus::PendingPayment => "pending_payment",
            ContestStatus::Active => "active",
            ContestStatus::Completed => "completed",
            ContestStatus::Cancelled => "cancelled",
            ContestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_payment" => Some(ContestStatus::PendingPayment),
            "active" => Some(ContestStatus::Active),
            "completed" => Some(ContestStatus::Completed),
            "cancelled" => Some(ContestStatus::Cancelled),
            "expired" => Some(ContestStatus::Expired),
            _ => None,
        }
    }
}

/// Engagement counter a contest pays out on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinMetric {
    ViewCount,
    LikeCount,
    CommentCount,
    ShareCount,
}

impl WinMetric {
    pub fn as_str(&self) -> &str {
        match self {
            WinMetric::ViewCount => "view_count",
            WinMetric::LikeCount => "like_count",
            WinMetric::CommentCount => "comment_count",
            WinMetric::ShareCount => "share_count",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view_count" => Some(WinMetric::ViewCount),
            "like_count" => Some(WinMetric::LikeCount),
            "comment_count" => Some(WinMetric::CommentCount),
            "share_count" => Some(WinMetric::ShareCount),
            _ => None,
        }
    }
}

/// What a submission must reach for its contest to settle
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WinCondition {
    pub metric: WinMetric,
    pub target: u64,
}

/// Engagement counters for a single clip. Platforms differ in which
/// counters they expose, so every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipMetrics {
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
}

impl ClipMetrics {
    pub fn get(&self, metric: WinMetric) -> Option<u64> {
        match metric {
            WinMetric::ViewCount => self.views,
            WinMetric::LikeCount => self.likes,
            WinMetric::CommentCount => self.comments,
            WinMetric::ShareCount => self.shares,
        }
    }
}

/// A clip submitted to a contest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub contest_id: String,
    pub profile_id: String,
    pub platform: Platform,
    pub content_url: String,
    pub metrics: ClipMetrics,
    pub last_synced_at: Option<i64>,
    pub review_status: ReviewStatus,
    pub created_at: i64,
}

/// A contest with a prize pool and a win condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    pub prize_pool_usd: f64,
    pub status: ContestStatus,
    pub win_condition: WinCondition,
    pub end_date: Option<i64>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Winner record written when a contest settles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestWinner {
    pub id: String,
    pub contest_id: String,
    pub profile_id: String,
    pub submission_id: String,
    pub rank: i64,
    pub prize_usd: f64,
    pub awarded_at: i64,
}

/// Creator profile with a prize balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub balance_usd: f64,
    pub updated_at: i64,
}

/// Singleton credential row per platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub platform: Platform,
    pub access_token: String,
    pub updated_at: i64,
}

/// Result of attempting to settle a contest for a winning submission
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// This call flipped the contest and recorded the winner
    Settled(ContestWinner),
    /// Another writer settled the contest first
    AlreadySettled,
    /// Contest was not in a settleable state when the write ran
    NotSettleable(ContestStatus),
}

/// One approved submission in an active contest, joined with the
/// contest fields the evaluator needs
#[derive(Debug, Clone)]
pub struct SyncCandidate {
    pub submission_id: String,
    pub contest_id: String,
    pub profile_id: String,
    pub platform: Platform,
    pub content_url: String,
    pub win_condition: WinCondition,
    pub prize_pool_usd: f64,
}

/// Per-submission outcome within one sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated,
    Winner,
    Skipped,
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            SyncOutcome::Updated => "updated",
            SyncOutcome::Winner => "winner",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub submission_id: String,
    pub contest_id: String,
    pub platform: Platform,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Summary of one full sync cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub scanned: usize,
    pub updated: usize,
    pub winners_found: usize,
    pub skipped: usize,
    pub failed: usize,
    pub expired_contests: usize,
    pub results: Vec<SubmissionResult>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub sync_interval_secs: u64,
    pub sync_concurrency: usize,
    pub credential_max_age_secs: i64,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
    pub youtube_refresh_token: Option<String>,
    pub tiktok_client_key: Option<String>,
    pub tiktok_client_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./cliparena.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let sync_interval_secs = std::env::var("SYNC_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let sync_concurrency = std::env::var("SYNC_CONCURRENCY")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .unwrap_or(4);

        let credential_max_age_secs = std::env::var("CREDENTIAL_MAX_AGE_SECS")
            .unwrap_or_else(|_| "5400".to_string())
            .parse()
            .unwrap_or(5400);

        let youtube_client_id = std::env::var("YOUTUBE_CLIENT_ID").ok();
        let youtube_client_secret = std::env::var("YOUTUBE_CLIENT_SECRET").ok();
        let youtube_refresh_token = std::env::var("YOUTUBE_REFRESH_TOKEN").ok();
        let tiktok_client_key = std::env::var("TIKTOK_CLIENT_KEY").ok();
        let tiktok_client_secret = std::env::var("TIKTOK_CLIENT_SECRET").ok();

        Ok(Self {
            database_path,
            port,
            sync_interval_secs,
            sync_concurrency,
            credential_max_age_secs,
            youtube_client_id,
            youtube_client_secret,
            youtube_refresh_token,
            tiktok_client_key,
            tiktok_client_secret,
        })
    }
}
