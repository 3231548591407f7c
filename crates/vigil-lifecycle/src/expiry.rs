use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::info;

use vigil_db::{Database, to_millis};

use crate::sweep::{SweepBudget, SweepJob, SweepReport, run_batches};

/// Retires messages whose TTL has elapsed.
///
/// The sweep only sets the `is_deleted` tombstone; readers filter on
/// `expires_at` themselves, so a message is invisible from the instant it
/// expires even if the sweep has not reached it yet. Tombstones are removed
/// physically by [`MessageExpiryEngine::purge`] once they are older than the
/// retention window.
#[derive(Clone)]
pub struct MessageExpiryEngine {
    db: Arc<Database>,
    budget: SweepBudget,
}

impl MessageExpiryEngine {
    pub fn new(db: Arc<Database>, budget: SweepBudget) -> Self {
        Self { db, budget }
    }

    /// Tombstone every live message with `expires_at <= now`.
    pub fn sweep_messages(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let db = &self.db;
        let now_ms = to_millis(now);

        let report = run_batches(
            db,
            SweepJob::MessageExpiry,
            &self.budget,
            now,
            String::as_str,
            |after, limit| db.expired_batch(now_ms, after, limit),
            |id| db.tombstone_if_live(id),
        )?;

        if report.processed > 0 || !report.complete {
            info!(
                tombstoned = report.processed,
                complete = report.complete,
                "message expiry pass"
            );
        }
        Ok(report)
    }

    /// Physically delete tombstones whose TTL ended more than `retention`
    /// ago. Works in batches and stops at the time budget; whatever is left
    /// is picked up next run.
    pub fn purge(&self, now: DateTime<Utc>, retention: Duration) -> Result<SweepReport> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| anyhow!("Retention out of range: {}", e))?;
        let before = to_millis(now - retention);
        let batch_size = self.budget.batch_size.max(1);
        let started = std::time::Instant::now();
        let mut purged = 0u64;

        loop {
            let removed = self.db.purge_tombstones(before, batch_size)?;
            purged += removed as u64;

            if removed < batch_size as usize {
                break;
            }
            if started.elapsed() >= self.budget.time_budget {
                info!(purged, "tombstone purge paused at budget");
                return Ok(SweepReport {
                    processed: purged,
                    complete: false,
                });
            }
        }

        if purged > 0 {
            info!(purged, "tombstone purge pass");
        }
        Ok(SweepReport {
            processed: purged,
            complete: true,
        })
    }
}
