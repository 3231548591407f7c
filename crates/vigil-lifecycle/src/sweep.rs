use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use vigil_db::{Database, to_millis};

/// Periodic jobs that scan a table in resumable batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepJob {
    PresenceReconcile,
    MessageExpiry,
    TombstonePurge,
}

impl SweepJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepJob::PresenceReconcile => "presence_reconcile",
            SweepJob::MessageExpiry => "message_expiry",
            SweepJob::TombstonePurge => "tombstone_purge",
        }
    }
}

impl fmt::Display for SweepJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds on a single sweep invocation.
#[derive(Debug, Clone, Copy)]
pub struct SweepBudget {
    /// Rows fetched per batch.
    pub batch_size: u32,
    /// Wall-clock budget. Checked between batches; at least one batch always runs.
    pub time_budget: Duration,
}

impl Default for SweepBudget {
    fn default() -> Self {
        Self {
            batch_size: 500,
            time_budget: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Rows actually changed by this invocation.
    pub processed: u64,
    /// False when the budget ran out and a cursor was left for the next tick.
    pub complete: bool,
}

/// Drive a cursor-paged sweep.
///
/// `fetch(after, limit)` returns the next page of candidates ordered by key;
/// `apply` performs the per-row conditional write and reports whether it
/// changed anything. The cursor is persisted after every batch, so an error
/// aborts the run without losing committed progress.
pub(crate) fn run_batches<T, F, A>(
    db: &Database,
    job: SweepJob,
    budget: &SweepBudget,
    now: DateTime<Utc>,
    key: fn(&T) -> &str,
    mut fetch: F,
    mut apply: A,
) -> Result<SweepReport>
where
    F: FnMut(Option<&str>, u32) -> Result<Vec<T>>,
    A: FnMut(&T) -> Result<bool>,
{
    let started = Instant::now();
    let batch_size = budget.batch_size.max(1);
    let mut cursor = db.load_cursor(job.as_str())?;
    let mut processed = 0u64;

    if let Some(c) = &cursor {
        debug!(job = %job, cursor = %c, "resuming sweep");
    }

    loop {
        let batch = fetch(cursor.as_deref(), batch_size)?;
        for item in &batch {
            if apply(item)? {
                processed += 1;
            }
        }

        let exhausted = (batch.len() as u32) < batch_size;
        cursor = batch.last().map(|item| key(item).to_string());

        if exhausted || cursor.is_none() {
            db.save_cursor(job.as_str(), None, to_millis(now))?;
            return Ok(SweepReport {
                processed,
                complete: true,
            });
        }

        db.save_cursor(job.as_str(), cursor.as_deref(), to_millis(now))?;

        if started.elapsed() >= budget.time_budget {
            debug!(job = %job, processed, "sweep budget exhausted, cursor saved");
            return Ok(SweepReport {
                processed,
                complete: false,
            });
        }
    }
}
