use std::sync::Arc;

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use vigil_db::Database;
use vigil_types::models::UserPresence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineStats {
    pub online: u64,
}

/// Read-only rollups over reconciled presence. Trusts the stored flag and
/// never re-derives liveness from `last_seen_at`, so it agrees with the
/// reconciler on what "online" means.
#[derive(Clone)]
pub struct PresenceStatsAggregator {
    db: Arc<Database>,
}

impl PresenceStatsAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Users with `is_online && !is_banned`.
    pub fn count(&self) -> Result<OnlineStats> {
        Ok(OnlineStats {
            online: self.db.count_online()?,
        })
    }

    /// Presence of a single user. Unknown users and store failures both read
    /// as offline.
    pub fn presence_of(&self, user_id: Uuid) -> UserPresence {
        let offline = UserPresence {
            user_id,
            is_online: false,
            last_seen_at: None,
            is_banned: false,
        };

        match self.db.get_presence(&user_id.to_string()) {
            Ok(Some(row)) => row.into_presence().unwrap_or_else(|e| {
                warn!(%user_id, "Corrupt presence row: {}", e);
                offline
            }),
            Ok(None) => offline,
            Err(e) => {
                warn!(%user_id, "Presence lookup failed, reporting offline: {}", e);
                offline
            }
        }
    }
}
