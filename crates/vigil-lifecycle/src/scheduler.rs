use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vigil_db::{Database, to_millis};

use crate::sweep::{SweepJob, SweepReport};

/// Background trigger for a sweep job.
///
/// Each tick takes the job's lease in the store, runs `sweep` off the async
/// runtime and releases the lease. Another process holding the lease makes
/// the tick a no-op. The lease lives for two intervals so a crashed holder
/// frees it on its own.
pub async fn run_sweep_loop<F>(
    db: Arc<Database>,
    job: SweepJob,
    interval: Duration,
    cancel: CancellationToken,
    sweep: F,
) where
    F: Fn(DateTime<Utc>) -> Result<SweepReport> + Send + Sync + 'static,
{
    if interval.is_zero() {
        error!(job = %job, "sweep interval must be non-zero, loop not started");
        return;
    }

    let holder = Uuid::new_v4().to_string();
    let lease_ttl = interval.saturating_mul(2);
    let sweep = Arc::new(sweep);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(job = %job, interval_secs = interval.as_secs(), "sweep loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let db = db.clone();
        let sweep = sweep.clone();
        let holder = holder.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_leased(&db, job, &holder, lease_ttl, |now| (*sweep)(now))
        })
        .await;

        match result {
            Ok(Ok(Some(report))) => {
                debug!(
                    job = %job,
                    processed = report.processed,
                    complete = report.complete,
                    "sweep tick"
                );
            }
            Ok(Ok(None)) => debug!(job = %job, "lease held elsewhere, skipping tick"),
            Ok(Err(e)) => warn!(job = %job, error = %e, "sweep failed, retrying next tick"),
            Err(e) => warn!(job = %job, error = %e, "sweep task panicked"),
        }
    }

    info!(job = %job, "sweep loop stopped");
}

/// Run `sweep` once if `holder` can take the lease for `job`. Returns
/// `None` when someone else holds it.
pub fn run_leased<F>(
    db: &Database,
    job: SweepJob,
    holder: &str,
    lease_ttl: Duration,
    sweep: F,
) -> Result<Option<SweepReport>>
where
    F: FnOnce(DateTime<Utc>) -> Result<SweepReport>,
{
    let now = Utc::now();
    let ttl_ms = i64::try_from(lease_ttl.as_millis()).unwrap_or(i64::MAX / 2);
    if !db.try_acquire_lease(job.as_str(), holder, to_millis(now), ttl_ms)? {
        return Ok(None);
    }

    let result = sweep(now);

    if let Err(e) = db.release_lease(job.as_str(), holder) {
        warn!(job = %job, error = %e, "failed to release sweep lease");
    }
    result.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::HeartbeatRecorder;
    use crate::reconciler::PresenceReconciler;
    use crate::sweep::SweepBudget;

    #[test]
    fn second_holder_skips_while_lease_is_held() {
        let db = Database::open_memory().unwrap();
        let job = SweepJob::MessageExpiry;
        let ttl = Duration::from_secs(60);

        let outer = run_leased(&db, job, "node-a", ttl, |_| {
            let inner = run_leased(&db, job, "node-b", ttl, |_| Ok(SweepReport::default()))?;
            assert!(inner.is_none());
            Ok(SweepReport {
                processed: 3,
                complete: true,
            })
        })
        .unwrap();
        assert_eq!(
            outer,
            Some(SweepReport {
                processed: 3,
                complete: true
            })
        );

        // Released after the run.
        let again = run_leased(&db, job, "node-b", ttl, |_| Ok(SweepReport::default())).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn failed_sweep_still_releases_lease() {
        let db = Database::open_memory().unwrap();
        let job = SweepJob::PresenceReconcile;
        let ttl = Duration::from_secs(60);

        let failed = run_leased(&db, job, "node-a", ttl, |_| Err(anyhow::anyhow!("store down")));
        assert!(failed.is_err());
        assert!(
            db.try_acquire_lease(job.as_str(), "node-b", to_millis(Utc::now()), 1_000)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn loop_sweeps_until_cancelled() {
        let db = Arc::new(Database::open_memory().unwrap());
        let recorder = HeartbeatRecorder::new(db.clone());
        recorder
            .record(Uuid::new_v4(), Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(db.count_online().unwrap(), 1);

        let reconciler = PresenceReconciler::new(db.clone(), SweepBudget::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweep_loop(
            db.clone(),
            SweepJob::PresenceReconcile,
            Duration::from_millis(10),
            cancel.clone(),
            move |now| reconciler.sweep(now, Duration::from_secs(300)),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(db.count_online().unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_interval_returns_instead_of_panicking() {
        let db = Arc::new(Database::open_memory().unwrap());
        let handle = tokio::spawn(run_sweep_loop(
            db,
            SweepJob::MessageExpiry,
            Duration::ZERO,
            CancellationToken::new(),
            |_| Ok(SweepReport::default()),
        ));

        let joined = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should exit on its own");
        assert!(joined.is_ok());
    }
}
