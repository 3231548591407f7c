use anyhow::Result;
use rusqlite::Connection;

use crate::models::{GhostCandidate, PresenceRow};
use crate::{Database, OptionalExt};

impl Database {
    /// Create the offline presence row that accompanies a new user.
    pub fn ensure_presence(&self, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT OR IGNORE INTO presence (user_id) VALUES (?1)", [user_id])?;
            Ok(())
        })
    }

    /// Mark the user online as of `seen_at`. Never moves `last_seen_at`
    /// backwards; returns false when an older heartbeat was ignored.
    pub fn record_heartbeat(&self, user_id: &str, seen_at: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO presence (user_id, is_online, last_seen_at) VALUES (?1, 1, ?2)
                 ON CONFLICT(user_id) DO UPDATE
                    SET is_online = 1, last_seen_at = excluded.last_seen_at
                    WHERE presence.last_seen_at IS NULL
                       OR presence.last_seen_at <= excluded.last_seen_at",
                rusqlite::params![user_id, seen_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Online rows whose last heartbeat is older than `cutoff`, ordered by
    /// user id and starting strictly after `after`.
    pub fn ghost_batch(
        &self,
        cutoff: i64,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<GhostCandidate>> {
        self.with_conn(|conn| query_ghost_batch(conn, cutoff, after.unwrap_or(""), limit))
    }

    /// Compare-and-set: clear the online flag only if `last_seen_at` still
    /// holds the value observed when the row was selected.
    pub fn clear_online_if_unchanged(&self, user_id: &str, observed: Option<i64>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE presence SET is_online = 0
                 WHERE user_id = ?1 AND is_online = 1 AND last_seen_at IS ?2",
                rusqlite::params![user_id, observed],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn count_online(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM presence WHERE is_online = 1 AND is_banned = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn get_presence(&self, user_id: &str) -> Result<Option<PresenceRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, is_online, last_seen_at, is_banned FROM presence WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(PresenceRow {
                        user_id: row.get(0)?,
                        is_online: row.get(1)?,
                        last_seen_at: row.get(2)?,
                        is_banned: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Ban flag is owned by moderation; exposed here so it can be synced in.
    pub fn set_banned(&self, user_id: &str, banned: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO presence (user_id, is_banned) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET is_banned = excluded.is_banned",
                rusqlite::params![user_id, banned],
            )?;
            Ok(())
        })
    }
}

fn query_ghost_batch(
    conn: &Connection,
    cutoff: i64,
    after: &str,
    limit: u32,
) -> Result<Vec<GhostCandidate>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, last_seen_at FROM presence
         WHERE is_online = 1
           AND (last_seen_at IS NULL OR last_seen_at < ?1)
           AND user_id > ?2
         ORDER BY user_id
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![cutoff, after, limit], |row| {
            Ok(GhostCandidate {
                user_id: row.get(0)?,
                observed_last_seen: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn heartbeat_creates_and_advances_row() {
        let db = Database::open_memory().unwrap();
        let u = user();

        assert!(db.record_heartbeat(&u, 1_000).unwrap());
        assert!(db.record_heartbeat(&u, 2_000).unwrap());

        let row = db.get_presence(&u).unwrap().unwrap();
        assert!(row.is_online);
        assert_eq!(row.last_seen_at, Some(2_000));
    }

    #[test]
    fn older_heartbeat_is_ignored() {
        let db = Database::open_memory().unwrap();
        let u = user();

        db.record_heartbeat(&u, 5_000).unwrap();
        assert!(!db.record_heartbeat(&u, 4_000).unwrap());

        let row = db.get_presence(&u).unwrap().unwrap();
        assert_eq!(row.last_seen_at, Some(5_000));
    }

    #[test]
    fn cas_skips_row_refreshed_after_selection() {
        let db = Database::open_memory().unwrap();
        let u = user();
        db.record_heartbeat(&u, 1_000).unwrap();

        let batch = db.ghost_batch(10_000, None, 10).unwrap();
        assert_eq!(batch.len(), 1);

        // Heartbeat lands between selection and write.
        db.record_heartbeat(&u, 10_500).unwrap();

        assert!(!db.clear_online_if_unchanged(&u, batch[0].observed_last_seen).unwrap());
        assert!(db.get_presence(&u).unwrap().unwrap().is_online);
    }

    #[test]
    fn ghost_batch_respects_cursor_and_limit() {
        let db = Database::open_memory().unwrap();
        let mut ids: Vec<String> = (0..5).map(|_| user()).collect();
        ids.sort();
        for id in &ids {
            db.record_heartbeat(id, 100).unwrap();
        }

        let first = db.ghost_batch(1_000, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].user_id, ids[0]);

        let rest = db.ghost_batch(1_000, Some(&first[1].user_id), 10).unwrap();
        let rest_ids: Vec<&str> = rest.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(rest_ids, ids[2..].iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn count_online_excludes_banned_and_offline() {
        let db = Database::open_memory().unwrap();
        let (a, b, c) = (user(), user(), user());
        db.record_heartbeat(&a, 100).unwrap();
        db.record_heartbeat(&b, 100).unwrap();
        db.ensure_presence(&c).unwrap();
        db.set_banned(&b, true).unwrap();

        assert_eq!(db.count_online().unwrap(), 1);
    }
}
