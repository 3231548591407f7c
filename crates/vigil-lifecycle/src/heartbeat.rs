use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use vigil_db::{Database, to_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// False when the heartbeat was older than the stored one and ignored.
    pub applied: bool,
}

/// Records liveness signals from authenticated clients. Identity is
/// established by the caller; this only ever sees a verified user id.
#[derive(Clone)]
pub struct HeartbeatRecorder {
    db: Arc<Database>,
}

impl HeartbeatRecorder {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Single row write: `is_online = true, last_seen_at = now`, unless a
    /// newer heartbeat is already stored.
    pub fn record(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<HeartbeatAck> {
        let applied = self.db.record_heartbeat(&user_id.to_string(), to_millis(now))?;
        if !applied {
            debug!(%user_id, %now, "ignored out-of-order heartbeat");
        }
        Ok(HeartbeatAck { applied })
    }
}
