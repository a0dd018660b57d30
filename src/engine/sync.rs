//! Sync cycle orchestration
//!
//! One cycle: expire overdue contests, select the work set, resolve one
//! access token per platform, fan out bounded metric fetches, evaluate and
//! settle winners. A failure on one submission never takes down the cycle.

use crate::credentials::CredentialCache;
use crate::engine::evaluator::win_triggered;
use crate::engine::settlement::SettlementCommitter;
use crate::models::{
    Platform, SettlementOutcome, SubmissionResult, SyncCandidate, SyncOutcome, SyncReport,
};
use crate::platforms::{MetricsAdapter, PlatformError};
use crate::store::ContestStore;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SyncOrchestrator {
    store: ContestStore,
    credentials: Arc<CredentialCache>,
    committer: SettlementCommitter,
    adapters: Arc<HashMap<Platform, Arc<dyn MetricsAdapter>>>,
    fetch_sem: Arc<Semaphore>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: ContestStore,
        credentials: Arc<CredentialCache>,
        adapters: Vec<Arc<dyn MetricsAdapter>>,
        max_concurrent_fetches: usize,
    ) -> Self {
        let committer = SettlementCommitter::new(store.clone());
        let adapters: HashMap<Platform, Arc<dyn MetricsAdapter>> = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();

        Self {
            store,
            credentials,
            committer,
            adapters: Arc::new(adapters),
            fetch_sem: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// The report from the most recent completed cycle, if any
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let cycle_start = Instant::now();

        // Expiry sweep is best effort; a failure here must not block
        // metric updates for everything else
        let expired_contests = match self
            .store
            .expire_overdue_contests(started_at.timestamp())
            .await
        {
            Ok(0) => 0,
            Ok(n) => {
                info!("🧹 Expired {} overdue contest(s)", n);
                n
            }
            Err(e) => {
                warn!("⚠️ Failed to expire overdue contests: {}", e);
                0
            }
        };

        let candidates = self
            .store
            .select_work_set()
            .await
            .context("Failed to select sync work set")?;
        let scanned = candidates.len();
        info!("📊 Sync cycle started: {} submission(s) to check", scanned);

        // One token per platform per cycle. A platform whose credentials
        // cannot be resolved fails all of its submissions in one stroke
        // instead of once per fetch.
        let platforms: HashSet<Platform> = candidates.iter().map(|c| c.platform).collect();
        let mut tokens: HashMap<Platform, Result<String, String>> = HashMap::new();
        for platform in platforms {
            let resolved = self
                .credentials
                .get_valid_token(platform)
                .await
                .map_err(|e| e.to_string());
            if let Err(detail) = &resolved {
                warn!(
                    "⚠️ No usable {} credential this cycle: {}",
                    platform.as_str(),
                    detail
                );
            }
            tokens.insert(platform, resolved);
        }

        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let token = tokens
                .get(&candidate.platform)
                .cloned()
                .unwrap_or_else(|| Err("no token resolved".to_string()));
            let permit = self
                .fetch_sem
                .clone()
                .acquire_owned()
                .await
                .context("fetch semaphore closed")?;
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                this.process_candidate(candidate, token).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!("⚠️ Sync task panicked: {}", e),
            }
        }

        let mut report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            duration_ms: cycle_start.elapsed().as_millis() as u64,
            scanned,
            updated: 0,
            winners_found: 0,
            skipped: 0,
            failed: 0,
            expired_contests,
            results,
        };
        for result in &report.results {
            match result.outcome {
                SyncOutcome::Updated => report.updated += 1,
                SyncOutcome::Winner => report.winners_found += 1,
                SyncOutcome::Skipped => report.skipped += 1,
                SyncOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            "✅ Sync cycle done in {}ms: {} updated, {} winner(s), {} skipped, {} failed",
            report.duration_ms,
            report.updated,
            report.winners_found,
            report.skipped,
            report.failed
        );

        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    async fn process_candidate(
        &self,
        candidate: SyncCandidate,
        token: Result<String, String>,
    ) -> SubmissionResult {
        let (outcome, detail) = self.sync_submission(&candidate, token).await;
        SubmissionResult {
            submission_id: candidate.submission_id,
            contest_id: candidate.contest_id,
            platform: candidate.platform,
            outcome,
            detail,
        }
    }

    async fn sync_submission(
        &self,
        candidate: &SyncCandidate,
        token: Result<String, String>,
    ) -> (SyncOutcome, Option<String>) {
        let Some(adapter) = self.adapters.get(&candidate.platform) else {
            return (
                SyncOutcome::Skipped,
                Some(format!(
                    "no adapter for platform {}",
                    candidate.platform.as_str()
                )),
            );
        };

        let content_id = match adapter.parse_content_id(&candidate.content_url) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "⚠️ Submission {} has an unusable URL: {}",
                    candidate.submission_id, e
                );
                return (SyncOutcome::Skipped, Some(e.to_string()));
            }
        };

        let token = match token {
            Ok(tok) => tok,
            Err(detail) => {
                return (
                    SyncOutcome::Failed,
                    Some(format!("credentials unavailable: {}", detail)),
                );
            }
        };

        let metrics = match adapter.fetch_metrics(&content_id, &token).await {
            Ok(m) => m,
            Err(PlatformError::AuthExpired) => {
                // One forced refresh, one retry. A second rejection is a
                // real failure.
                info!(
                    "🔄 {} rejected the cached token, refreshing and retrying submission {}",
                    candidate.platform.as_str(),
                    candidate.submission_id
                );
                let fresh = match self.credentials.force_refresh(candidate.platform).await {
                    Ok(tok) => tok,
                    Err(e) => {
                        warn!(
                            "⚠️ Forced {} token refresh failed: {}",
                            candidate.platform.as_str(),
                            e
                        );
                        return (
                            SyncOutcome::Failed,
                            Some(format!("token refresh failed: {}", e)),
                        );
                    }
                };
                match adapter.fetch_metrics(&content_id, &fresh).await {
                    Ok(m) => m,
                    Err(e) => return self.fetch_failure(candidate, e),
                }
            }
            Err(e) => return self.fetch_failure(candidate, e),
        };

        let synced_at = Utc::now().timestamp();
        if let Err(e) = self
            .store
            .record_metrics(&candidate.submission_id, &metrics, synced_at)
            .await
        {
            warn!(
                "⚠️ Failed to record metrics for submission {}: {}",
                candidate.submission_id, e
            );
            return (
                SyncOutcome::Failed,
                Some(format!("metric write failed: {}", e)),
            );
        }

        if !win_triggered(&metrics, &candidate.win_condition) {
            return (SyncOutcome::Updated, None);
        }

        match self.committer.settle(candidate).await {
            Ok(SettlementOutcome::Settled(_)) => (SyncOutcome::Winner, None),
            Ok(SettlementOutcome::AlreadySettled) => (
                SyncOutcome::Skipped,
                Some("contest already settled".to_string()),
            ),
            Ok(SettlementOutcome::NotSettleable(status)) => (
                SyncOutcome::Skipped,
                Some(format!("contest is {}", status.as_str())),
            ),
            Err(e) => (
                SyncOutcome::Failed,
                Some(format!("settlement failed: {}", e)),
            ),
        }
    }

    fn fetch_failure(
        &self,
        candidate: &SyncCandidate,
        err: PlatformError,
    ) -> (SyncOutcome, Option<String>) {
        match &err {
            PlatformError::InvalidUrl(_) | PlatformError::NotFound(_) => {
                warn!("⚠️ Submission {} skipped: {}", candidate.submission_id, err);
                (SyncOutcome::Skipped, Some(err.to_string()))
            }
            PlatformError::AuthExpired => {
                warn!(
                    "⚠️ Submission {} failed: token rejected twice",
                    candidate.submission_id
                );
                (SyncOutcome::Failed, Some(err.to_string()))
            }
            PlatformError::RateLimited | PlatformError::Upstream(_) => {
                warn!(
                    "⚠️ Submission {} failed, will retry next cycle: {}",
                    candidate.submission_id, err
                );
                (SyncOutcome::Failed, Some(err.to_string()))
            }
        }
    }
}
