use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::info;

use vigil_db::models::GhostCandidate;
use vigil_db::{Database, to_millis};

use crate::sweep::{SweepBudget, SweepJob, SweepReport, run_batches};

/// Clears online flags left behind by clients that stopped sending
/// heartbeats. Safe to overlap with itself: every write is a compare-and-set
/// on the timestamp observed at selection time.
#[derive(Clone)]
pub struct PresenceReconciler {
    db: Arc<Database>,
    budget: SweepBudget,
}

impl PresenceReconciler {
    pub fn new(db: Arc<Database>, budget: SweepBudget) -> Self {
        Self { db, budget }
    }

    /// Flip every online row with `last_seen_at < now - staleness` to
    /// offline. A row whose heartbeat advanced after selection is skipped.
    pub fn sweep(&self, now: DateTime<Utc>, staleness: Duration) -> Result<SweepReport> {
        let staleness = chrono::Duration::from_std(staleness)
            .map_err(|e| anyhow!("Staleness threshold out of range: {}", e))?;
        let cutoff = now
            .checked_sub_signed(staleness)
            .map(to_millis)
            .ok_or_else(|| anyhow!("Staleness threshold underflows the sweep clock"))?;
        let db = &self.db;

        let report = run_batches(
            db,
            SweepJob::PresenceReconcile,
            &self.budget,
            now,
            ghost_key,
            |after, limit| db.ghost_batch(cutoff, after, limit),
            |ghost| db.clear_online_if_unchanged(&ghost.user_id, ghost.observed_last_seen),
        )?;

        if report.processed > 0 || !report.complete {
            info!(
                flipped = report.processed,
                complete = report.complete,
                "presence reconcile pass"
            );
        }
        Ok(report)
    }
}

fn ghost_key(ghost: &GhostCandidate) -> &str {
    &ghost.user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::HeartbeatRecorder;
    use uuid::Uuid;

    const FIVE_MIN: Duration = Duration::from_secs(300);

    fn setup() -> (Arc<Database>, HeartbeatRecorder, PresenceReconciler) {
        let db = Arc::new(Database::open_memory().unwrap());
        let recorder = HeartbeatRecorder::new(db.clone());
        let reconciler = PresenceReconciler::new(db.clone(), SweepBudget::default());
        (db, recorder, reconciler)
    }

    fn is_online(db: &Database, user: Uuid) -> bool {
        db.get_presence(&user.to_string()).unwrap().unwrap().is_online
    }

    #[test]
    fn ghost_is_cleared_and_live_user_kept() {
        let (db, recorder, reconciler) = setup();
        let now = Utc::now();
        let ghost = Uuid::new_v4();
        let live = Uuid::new_v4();
        recorder.record(ghost, now - chrono::Duration::minutes(6)).unwrap();
        recorder.record(live, now - chrono::Duration::minutes(4)).unwrap();

        let report = reconciler.sweep(now, FIVE_MIN).unwrap();
        assert_eq!(
            report,
            SweepReport {
                processed: 1,
                complete: true
            }
        );
        assert!(!is_online(&db, ghost));
        assert!(is_online(&db, live));

        assert_eq!(reconciler.sweep(now, FIVE_MIN).unwrap().processed, 0);
    }

    #[test]
    fn heartbeat_racing_a_sweep_survives() {
        let (db, recorder, _) = setup();
        let now = Utc::now();
        let user = Uuid::new_v4();
        recorder.record(user, now - chrono::Duration::minutes(6)).unwrap();

        let cutoff = to_millis(now - chrono::Duration::minutes(5));
        let selected = db.ghost_batch(cutoff, None, 10).unwrap();
        recorder.record(user, now).unwrap();

        for ghost in &selected {
            db.clear_online_if_unchanged(&ghost.user_id, ghost.observed_last_seen)
                .unwrap();
        }
        assert!(is_online(&db, user));
    }

    #[test]
    fn exhausted_budget_resumes_from_cursor() {
        let (db, recorder, _) = setup();
        let reconciler = PresenceReconciler::new(
            db.clone(),
            SweepBudget {
                batch_size: 2,
                time_budget: Duration::ZERO,
            },
        );
        let now = Utc::now();
        for _ in 0..5 {
            recorder.record(Uuid::new_v4(), now - chrono::Duration::hours(1)).unwrap();
        }

        let first = reconciler.sweep(now, FIVE_MIN).unwrap();
        assert_eq!(
            first,
            SweepReport {
                processed: 2,
                complete: false
            }
        );
        assert!(db.load_cursor(SweepJob::PresenceReconcile.as_str()).unwrap().is_some());

        let second = reconciler.sweep(now, FIVE_MIN).unwrap();
        assert_eq!(
            second,
            SweepReport {
                processed: 2,
                complete: false
            }
        );

        let third = reconciler.sweep(now, FIVE_MIN).unwrap();
        assert_eq!(
            third,
            SweepReport {
                processed: 1,
                complete: true
            }
        );
        assert_eq!(db.load_cursor(SweepJob::PresenceReconcile.as_str()).unwrap(), None);
        assert_eq!(db.count_online().unwrap(), 0);
    }

    #[test]
    fn staleness_past_the_epoch_is_an_error() {
        let (_, _, reconciler) = setup();
        let err = reconciler
            .sweep(Utc::now(), Duration::from_secs(u64::MAX / 4))
            .unwrap_err();
        assert!(err.to_string().contains("Staleness threshold"));

        let early = DateTime::<Utc>::MIN_UTC + chrono::Duration::seconds(10);
        assert!(reconciler.sweep(early, FIVE_MIN).is_err());
    }
}
