use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL DEFAULT '',
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workspaces (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            workspace_id  TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
            is_chain      INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_workspace
            ON channels(workspace_id);

        CREATE TABLE IF NOT EXISTS dm_groups (
            id          TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dm_group_members (
            group_id    TEXT NOT NULL REFERENCES dm_groups(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_dm_group_members_user
            ON dm_group_members(user_id);

        -- A message belongs to exactly one destination. The CHECK makes a
        -- both-or-neither row unrepresentable at the storage layer too.
        CREATE TABLE IF NOT EXISTS messages (
            id           TEXT PRIMARY KEY,
            sender_id    TEXT NOT NULL REFERENCES users(id),
            channel_id   TEXT REFERENCES channels(id) ON DELETE CASCADE,
            dm_group_id  TEXT REFERENCES dm_groups(id) ON DELETE CASCADE,
            content      TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            CHECK ((channel_id IS NULL) <> (dm_group_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_dm_group
            ON messages(dm_group_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
