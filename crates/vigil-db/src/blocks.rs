use std::collections::HashSet;

use anyhow::Result;

use crate::Database;

impl Database {
    pub fn block(&self, blocker_id: &str, blocked_id: &str, now: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![blocker_id, blocked_id, now],
            )?;
            Ok(())
        })
    }

    pub fn unblock(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                [blocker_id, blocked_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Every peer that `user_id` blocked or was blocked by.
    pub fn blocked_peers(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT blocked_id FROM blocks WHERE blocker_id = ?1
                 UNION
                 SELECT blocker_id FROM blocks WHERE blocked_id = ?1",
            )?;
            let peers = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(peers)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_peers_is_symmetric() {
        let db = Database::open_memory().unwrap();
        db.block("a", "b", 0).unwrap();
        db.block("c", "a", 0).unwrap();

        let of_a = db.blocked_peers("a").unwrap();
        assert!(of_a.contains("b") && of_a.contains("c"));
        assert!(db.blocked_peers("b").unwrap().contains("a"));

        assert!(db.unblock("a", "b").unwrap());
        assert!(!db.blocked_peers("b").unwrap().contains("a"));
    }
}
