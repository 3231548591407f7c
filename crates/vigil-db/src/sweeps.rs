use anyhow::Result;

use crate::{Database, OptionalExt};

impl Database {
    /// Resume point left by an interrupted sweep, if any.
    pub fn load_cursor(&self, job: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "SELECT cursor FROM sweep_cursors WHERE job = ?1",
                [job],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// `None` clears the cursor so the next run starts a fresh pass.
    pub fn save_cursor(&self, job: &str, cursor: Option<&str>, now: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            match cursor {
                Some(cursor) => conn.execute(
                    "INSERT INTO sweep_cursors (job, cursor, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(job) DO UPDATE
                        SET cursor = excluded.cursor, updated_at = excluded.updated_at",
                    rusqlite::params![job, cursor, now],
                )?,
                None => conn.execute("DELETE FROM sweep_cursors WHERE job = ?1", [job])?,
            };
            Ok(())
        })
    }

    /// Take or renew the lease for `job`. Succeeds if nobody holds it, the
    /// previous lease has lapsed, or `holder` already owns it.
    pub fn try_acquire_lease(
        &self,
        job: &str,
        holder: &str,
        now: i64,
        ttl_ms: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO sweep_leases (job, holder, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job) DO UPDATE
                    SET holder = excluded.holder, expires_at = excluded.expires_at
                    WHERE sweep_leases.expires_at <= ?4
                       OR sweep_leases.holder = excluded.holder",
                rusqlite::params![job, holder, now + ttl_ms, now],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn release_lease(&self, job: &str, holder: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM sweep_leases WHERE job = ?1 AND holder = ?2",
                [job, holder],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip_and_clear() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.load_cursor("presence").unwrap(), None);

        db.save_cursor("presence", Some("abc"), 1).unwrap();
        db.save_cursor("presence", Some("def"), 2).unwrap();
        assert_eq!(db.load_cursor("presence").unwrap().as_deref(), Some("def"));

        db.save_cursor("presence", None, 3).unwrap();
        assert_eq!(db.load_cursor("presence").unwrap(), None);
    }

    #[test]
    fn lease_excludes_other_holders_until_expiry() {
        let db = Database::open_memory().unwrap();

        assert!(db.try_acquire_lease("expiry", "node-a", 0, 1_000).unwrap());
        assert!(!db.try_acquire_lease("expiry", "node-b", 500, 1_000).unwrap());
        assert!(db.try_acquire_lease("expiry", "node-a", 600, 1_000).unwrap());
        assert!(db.try_acquire_lease("expiry", "node-b", 1_600, 1_000).unwrap());

        db.release_lease("expiry", "node-b").unwrap();
        assert!(db.try_acquire_lease("expiry", "node-a", 1_700, 1_000).unwrap());
    }
}
