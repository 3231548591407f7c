//! Database row types. These map directly to SQLite rows.
//! Distinct from vigil-types models to keep the DB layer independent.

use anyhow::Result;
use vigil_types::models::{Message, UserPresence};

use crate::from_millis;

pub struct PresenceRow {
    pub user_id: String,
    pub is_online: bool,
    pub last_seen_at: Option<i64>,
    pub is_banned: bool,
}

impl PresenceRow {
    pub fn into_presence(self) -> Result<UserPresence> {
        Ok(UserPresence {
            user_id: self.user_id.parse()?,
            is_online: self.is_online,
            last_seen_at: self.last_seen_at.map(from_millis).transpose()?,
            is_banned: self.is_banned,
        })
    }
}

/// A presence row picked up by a reconciliation batch, with the timestamp
/// observed at selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostCandidate {
    pub user_id: String,
    pub observed_last_seen: Option<i64>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub is_read: bool,
    pub is_deleted: bool,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id.parse()?,
            sender_id: self.sender_id.parse()?,
            receiver_id: self.receiver_id.parse()?,
            body: self.body,
            created_at: from_millis(self.created_at)?,
            expires_at: self.expires_at.map(from_millis).transpose()?,
            is_read: self.is_read,
            is_deleted: self.is_deleted,
        })
    }
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub body: &'a str,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}
