use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Liveness state for one user. `is_banned` is owned by moderation and only
/// read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub is_banned: bool,
}

/// A direct message with an optional TTL boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_deleted: bool,
}

impl Message {
    /// Whether the TTL has elapsed as of `now`, independent of tombstoning.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Unordered block pair. Either direction excludes the pair from unread
/// accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRelationship {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}
