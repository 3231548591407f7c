use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (presence, messages, blocks)");
        conn.execute_batch(
            "
            CREATE TABLE presence (
                user_id       TEXT PRIMARY KEY,
                is_online     INTEGER NOT NULL DEFAULT 0,
                last_seen_at  INTEGER,
                is_banned     INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_presence_online
                ON presence(is_online, last_seen_at);

            CREATE TABLE messages (
                id           TEXT PRIMARY KEY,
                sender_id    TEXT NOT NULL,
                receiver_id  TEXT NOT NULL,
                body         TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                expires_at   INTEGER,
                is_read      INTEGER NOT NULL DEFAULT 0,
                is_deleted   INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_receiver
                ON messages(receiver_id, is_read, is_deleted);

            CREATE INDEX idx_messages_expires
                ON messages(expires_at)
                WHERE expires_at IS NOT NULL;

            CREATE TABLE blocks (
                blocker_id  TEXT NOT NULL,
                blocked_id  TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE INDEX idx_blocks_blocked
                ON blocks(blocked_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (sweep cursors and leases)");
        conn.execute_batch(
            "
            CREATE TABLE sweep_cursors (
                job         TEXT PRIMARY KEY,
                cursor      TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE sweep_leases (
                job         TEXT PRIMARY KEY,
                holder      TEXT NOT NULL,
                expires_at  INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
