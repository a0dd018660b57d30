//! Settlement commits
//!
//! Thin wrapper over the store transaction that owns the logging policy:
//! a settled contest is a headline event, a lost race is routine, and a
//! failed settlement after a confirmed win is the loudest error this
//! service emits because it means a creator hit the target and was not
//! paid.

use crate::models::{SettlementOutcome, SyncCandidate};
use crate::store::ContestStore;
use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct SettlementCommitter {
    store: ContestStore,
}

impl SettlementCommitter {
    pub fn new(store: ContestStore) -> Self {
        Self { store }
    }

    pub async fn settle(&self, candidate: &SyncCandidate) -> Result<SettlementOutcome> {
        let now = Utc::now().timestamp();
        match self
            .store
            .settle_contest(
                &candidate.contest_id,
                &candidate.profile_id,
                &candidate.submission_id,
                now,
            )
            .await
        {
            Ok(SettlementOutcome::Settled(winner)) => {
                info!(
                    "🏆 Contest {} settled: {} wins ${:.2} with submission {}",
                    candidate.contest_id,
                    winner.profile_id,
                    winner.prize_usd,
                    winner.submission_id
                );
                Ok(SettlementOutcome::Settled(winner))
            }
            Ok(SettlementOutcome::AlreadySettled) => {
                info!(
                    "Contest {} already settled by another writer, skipping",
                    candidate.contest_id
                );
                Ok(SettlementOutcome::AlreadySettled)
            }
            Ok(SettlementOutcome::NotSettleable(status)) => {
                warn!(
                    "⚠️ Contest {} is {} and cannot settle",
                    candidate.contest_id,
                    status.as_str()
                );
                Ok(SettlementOutcome::NotSettleable(status))
            }
            Err(e) => {
                error!(
                    "🚨 SETTLEMENT FAILED for contest {} (submission {}, profile {}): {}",
                    candidate.contest_id, candidate.submission_id, candidate.profile_id, e
                );
                Err(e)
            }
        }
    }
}
