use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use vigil_db::{Database, to_millis};
use vigil_types::models::Message;

/// Source of block relationships, owned by moderation.
pub trait BlockProvider: Send + Sync {
    /// Peers `user_id` blocked or was blocked by.
    fn blocked_peers(&self, user_id: &str) -> Result<HashSet<String>>;
}

impl BlockProvider for Database {
    fn blocked_peers(&self, user_id: &str) -> Result<HashSet<String>> {
        Database::blocked_peers(self, user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadCount {
    pub unread_count: u64,
}

/// Unread and inbox read-models. The excluded-peer set is derived on every
/// call; nothing is cached.
#[derive(Clone)]
pub struct UnreadCounter {
    db: Arc<Database>,
    blocks: Arc<dyn BlockProvider>,
}

impl UnreadCounter {
    pub fn new(db: Arc<Database>, blocks: Arc<dyn BlockProvider>) -> Self {
        Self { db, blocks }
    }

    pub fn count(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<UnreadCount> {
        let user = user_id.to_string();
        let excluded = self.blocks.blocked_peers(&user)?;
        let unread_count = self.db.count_unread(&user, to_millis(now), &excluded)?;
        Ok(UnreadCount { unread_count })
    }

    /// Same as [`count`](Self::count) but reads a failure as zero, for
    /// callers that poll and would rather show nothing than an error.
    pub fn count_or_zero(&self, user_id: Uuid, now: DateTime<Utc>) -> UnreadCount {
        self.count(user_id, now).unwrap_or_else(|e| {
            warn!(%user_id, "Unread count failed, reporting zero: {}", e);
            UnreadCount { unread_count: 0 }
        })
    }

    /// Newest-first visible messages for `user_id`, minus blocked peers.
    pub fn inbox(&self, user_id: Uuid, now: DateTime<Utc>, limit: u32) -> Result<Vec<Message>> {
        let user = user_id.to_string();
        let excluded = self.blocks.blocked_peers(&user)?;
        let rows = self.db.inbox(&user, to_millis(now), &excluded, limit)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_message() {
                // Readers re-check the TTL against their own clock.
                Ok(m) if !m.is_expired_at(now) => messages.push(m),
                Ok(_) => {}
                Err(e) => warn!("Skipping corrupt message '{}': {}", id, e),
            }
        }
        Ok(messages)
    }
}
