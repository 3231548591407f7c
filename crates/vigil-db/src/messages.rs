use std::collections::HashSet;

use anyhow::Result;
use rusqlite::types::ToSql;

use crate::Database;
use crate::models::{MessageRow, NewMessage};

/// Visibility predicate shared by every reader: not tombstoned and not past
/// its TTL as of the caller's `now` (bound as `?2`).
const VISIBLE: &str = "is_deleted = 0 AND (expires_at IS NULL OR expires_at > ?2)";

impl Database {
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    msg.id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.body,
                    msg.created_at,
                    msg.expires_at
                ],
            )?;
            Ok(())
        })
    }

    /// Flip `is_read` once, only for the receiver and only while visible.
    pub fn mark_read(&self, id: &str, receiver_id: &str, now: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE messages SET is_read = 1
                 WHERE id = ?1 AND receiver_id = ?3 AND is_read = 0 AND {VISIBLE}"
            );
            let changed = conn.execute(&sql, rusqlite::params![id, now, receiver_id])?;
            Ok(changed > 0)
        })
    }

    /// Ids of live messages whose TTL has elapsed, ordered by id and
    /// starting strictly after `after`.
    pub fn expired_batch(&self, now: i64, after: Option<&str>, limit: u32) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM messages
                 WHERE is_deleted = 0
                   AND expires_at IS NOT NULL
                   AND expires_at <= ?1
                   AND id > ?2
                 ORDER BY id
                 LIMIT ?3",
            )?;
            let ids = stmt
                .query_map(rusqlite::params![now, after.unwrap_or(""), limit], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Soft-delete a message. Returns false if it was already tombstoned.
    pub fn tombstone_if_live(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Unread, visible messages for `receiver_id` from senders outside `excluded`.
    pub fn count_unread(
        &self,
        receiver_id: &str,
        now: i64,
        excluded: &HashSet<String>,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND is_read = 0 AND {VISIBLE}{}",
                sender_exclusion(excluded.len())
            );
            let params = bind_with_exclusions(&receiver_id, &now, excluded);
            let count: i64 = conn.query_row(&sql, params.as_slice(), |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Newest-first visible messages for `receiver_id`, minus blocked senders.
    pub fn inbox(
        &self,
        receiver_id: &str,
        now: i64,
        excluded: &HashSet<String>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, sender_id, receiver_id, body, created_at, expires_at, is_read, is_deleted
                 FROM messages
                 WHERE receiver_id = ?1 AND {VISIBLE}{}
                 ORDER BY created_at DESC
                 LIMIT {limit}",
                sender_exclusion(excluded.len())
            );
            let params = bind_with_exclusions(&receiver_id, &now, excluded);

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        body: row.get(3)?,
                        created_at: row.get(4)?,
                        expires_at: row.get(5)?,
                        is_read: row.get(6)?,
                        is_deleted: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Physically remove tombstoned messages whose TTL ended before `before`.
    pub fn purge_tombstones(&self, before: i64, limit: u32) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM messages WHERE id IN (
                    SELECT id FROM messages
                    WHERE is_deleted = 1 AND expires_at IS NOT NULL AND expires_at < ?1
                    LIMIT ?2
                 )",
                rusqlite::params![before, limit],
            )?;
            Ok(removed)
        })
    }
}

/// `AND sender_id NOT IN (?3, ?4, ...)`, or nothing for an empty set.
fn sender_exclusion(count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let placeholders: Vec<String> = (3..3 + count).map(|i| format!("?{}", i)).collect();
    format!(" AND sender_id NOT IN ({})", placeholders.join(", "))
}

fn bind_with_exclusions<'a>(
    receiver_id: &'a &str,
    now: &'a i64,
    excluded: &'a HashSet<String>,
) -> Vec<&'a dyn ToSql> {
    let mut params: Vec<&dyn ToSql> = vec![receiver_id as &dyn ToSql, now as &dyn ToSql];
    params.extend(excluded.iter().map(|id| id as &dyn ToSql));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id() -> String {
        Uuid::new_v4().to_string()
    }

    fn send(
        db: &Database,
        from: &str,
        to: &str,
        created_at: i64,
        expires_at: Option<i64>,
    ) -> String {
        let mid = id();
        db.insert_message(&NewMessage {
            id: &mid,
            sender_id: from,
            receiver_id: to,
            body: "hi",
            created_at,
            expires_at,
        })
        .unwrap();
        mid
    }

    #[test]
    fn unread_skips_expired_before_tombstoning() {
        let db = Database::open_memory().unwrap();
        let (a, b) = (id(), id());
        send(&db, &a, &b, 0, Some(60_000));
        send(&db, &a, &b, 0, None);

        let none = HashSet::new();
        assert_eq!(db.count_unread(&b, 30_000, &none).unwrap(), 2);
        assert_eq!(db.count_unread(&b, 60_000, &none).unwrap(), 1);
    }

    #[test]
    fn unread_excludes_listed_senders() {
        let db = Database::open_memory().unwrap();
        let (a, b, c) = (id(), id(), id());
        send(&db, &a, &c, 0, None);
        send(&db, &b, &c, 0, None);
        send(&db, &b, &c, 0, None);

        let excluded: HashSet<String> = [b.clone()].into_iter().collect();
        assert_eq!(db.count_unread(&c, 1, &excluded).unwrap(), 1);
        assert_eq!(db.inbox(&c, 1, &excluded, 50).unwrap().len(), 1);
    }

    #[test]
    fn mark_read_only_for_receiver() {
        let db = Database::open_memory().unwrap();
        let (a, b) = (id(), id());
        let mid = send(&db, &a, &b, 0, None);

        assert!(!db.mark_read(&mid, &a, 1).unwrap());
        assert!(db.mark_read(&mid, &b, 1).unwrap());
        assert!(!db.mark_read(&mid, &b, 2).unwrap());
        assert_eq!(db.count_unread(&b, 3, &HashSet::new()).unwrap(), 0);
    }

    #[test]
    fn tombstone_then_purge() {
        let db = Database::open_memory().unwrap();
        let (a, b) = (id(), id());
        let mid = send(&db, &a, &b, 0, Some(1_000));

        assert_eq!(db.expired_batch(1_000, None, 10).unwrap(), vec![mid.clone()]);
        assert!(db.tombstone_if_live(&mid).unwrap());
        assert!(!db.tombstone_if_live(&mid).unwrap());
        assert!(db.expired_batch(1_000, None, 10).unwrap().is_empty());

        assert_eq!(db.purge_tombstones(1_000, 10).unwrap(), 0);
        assert_eq!(db.purge_tombstones(1_001, 10).unwrap(), 1);
    }
}
