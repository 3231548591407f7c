//! Presence liveness and message TTL lifecycle.
//!
//! Each component is a plain struct over the shared [`vigil_db::Database`];
//! none of them call each other. Sweeps take `now` as a parameter so the
//! trigger (timer, cron route, test) stays outside the core.

pub mod expiry;
pub mod heartbeat;
pub mod reconciler;
pub mod scheduler;
pub mod stats;
pub mod sweep;
pub mod unread;

pub use expiry::MessageExpiryEngine;
pub use heartbeat::{HeartbeatAck, HeartbeatRecorder};
pub use reconciler::PresenceReconciler;
pub use stats::{OnlineStats, PresenceStatsAggregator};
pub use sweep::{SweepBudget, SweepJob, SweepReport};
pub use unread::{BlockProvider, UnreadCount, UnreadCounter};
