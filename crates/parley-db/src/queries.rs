use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use parley_types::models::{Destination, MessageOrder};

use crate::Database;
use crate::models::{ChannelRow, DmGroupRow, MessageRow, UserRow, WorkspaceRow};

/// Outcome of a DM-group resolution. `UnknownUsers` carries the ids that
/// failed validation so the caller can report them.
pub enum ResolveGroup {
    Existing(DmGroupRow),
    Created(DmGroupRow),
    UnknownUsers(Vec<String>),
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, username, email, password_hash, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, email, password, created_at
                     FROM users WHERE username = ?1",
                )?
                .query_row([username], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, email, password, created_at
                     FROM users WHERE id = ?1",
                )?
                .query_row([id], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let rows = conn
                .prepare(
                    "SELECT id, username, email, password, created_at
                     FROM users ORDER BY username",
                )?
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Workspaces --

    pub fn insert_workspace(&self, id: &str, name: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO workspaces (id, name, created_at) VALUES (?1, ?2, ?3)",
                (id, name, created_at),
            )?;
            Ok(())
        })
    }

    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceRow>> {
        self.with_conn(|conn| {
            let rows = conn
                .prepare("SELECT id, name, created_at FROM workspaces ORDER BY created_at")?
                .query_map([], map_workspace)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_workspace(&self, id: &str) -> Result<Option<WorkspaceRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare("SELECT id, name, created_at FROM workspaces WHERE id = ?1")?
                .query_row([id], map_workspace)
                .optional()?;
            Ok(row)
        })
    }

    pub fn rename_workspace(&self, id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE workspaces SET name = ?2 WHERE id = ?1", (id, name))?;
            Ok(n > 0)
        })
    }

    /// Cascades to the workspace's channels and their messages.
    pub fn delete_workspace(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM workspaces WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Channels --

    pub fn insert_channel(
        &self,
        id: &str,
        name: &str,
        workspace_id: &str,
        is_chain: bool,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name, workspace_id, is_chain, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, name, workspace_id, is_chain, created_at),
            )?;
            Ok(())
        })
    }

    pub fn list_channels(&self, workspace_id: Option<&str>) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let rows = match workspace_id {
                Some(wid) => conn
                    .prepare(
                        "SELECT id, name, workspace_id, is_chain, created_at
                         FROM channels WHERE workspace_id = ?1 ORDER BY created_at",
                    )?
                    .query_map([wid], map_channel)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => conn
                    .prepare(
                        "SELECT id, name, workspace_id, is_chain, created_at
                         FROM channels ORDER BY created_at",
                    )?
                    .query_map([], map_channel)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })
    }

    pub fn list_chain_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let rows = conn
                .prepare(
                    "SELECT id, name, workspace_id, is_chain, created_at
                     FROM channels WHERE is_chain = 1 ORDER BY created_at",
                )?
                .query_map([], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, name, workspace_id, is_chain, created_at
                     FROM channels WHERE id = ?1",
                )?
                .query_row([id], map_channel)
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_channel(
        &self,
        id: &str,
        name: Option<&str>,
        is_chain: Option<bool>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE channels
                 SET name = COALESCE(?2, name), is_chain = COALESCE(?3, is_chain)
                 WHERE id = ?1",
                (id, name, is_chain),
            )?;
            Ok(n > 0)
        })
    }

    /// Cascades to the channel's messages.
    pub fn delete_channel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- DM groups --

    /// Find-or-create the group whose membership equals `member_ids` exactly.
    ///
    /// The scan and the create run in one transaction under the connection
    /// lock, so concurrent identical requests cannot race into duplicates.
    /// Unknown member ids reject the whole request rather than being dropped.
    pub fn resolve_or_create_group(
        &self,
        member_ids: &BTreeSet<String>,
        new_id: &str,
        created_at: &str,
    ) -> Result<ResolveGroup> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let unknown = unknown_user_ids(&tx, member_ids)?;
            if !unknown.is_empty() {
                return Ok(ResolveGroup::UnknownUsers(unknown));
            }

            // Linear scan: membership equality, not subset/superset.
            let groups = tx
                .prepare("SELECT id, created_at FROM dm_groups")?
                .query_map([], map_dm_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for group in groups {
                let members = member_set(&tx, &group.id)?;
                if members == *member_ids {
                    tx.commit()?;
                    return Ok(ResolveGroup::Existing(group));
                }
            }

            tx.execute(
                "INSERT INTO dm_groups (id, created_at) VALUES (?1, ?2)",
                (new_id, created_at),
            )?;
            for user_id in member_ids {
                tx.execute(
                    "INSERT INTO dm_group_members (group_id, user_id) VALUES (?1, ?2)",
                    (new_id, user_id),
                )?;
            }
            tx.commit()?;

            Ok(ResolveGroup::Created(DmGroupRow {
                id: new_id.to_string(),
                created_at: created_at.to_string(),
            }))
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<DmGroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare("SELECT id, created_at FROM dm_groups WHERE id = ?1")?
                .query_row([id], map_dm_group)
                .optional()?;
            Ok(row)
        })
    }

    /// Groups the given user belongs to.
    pub fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<DmGroupRow>> {
        self.with_conn(|conn| {
            let rows = conn
                .prepare(
                    "SELECT g.id, g.created_at
                     FROM dm_groups g
                     JOIN dm_group_members m ON m.group_id = g.id
                     WHERE m.user_id = ?1
                     ORDER BY g.created_at",
                )?
                .query_map([user_id], map_dm_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let rows = conn
                .prepare(
                    "SELECT u.id, u.username, u.email, u.password, u.created_at
                     FROM users u
                     JOIN dm_group_members m ON m.user_id = u.id
                     WHERE m.group_id = ?1
                     ORDER BY u.username",
                )?
                .query_map([group_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Cascades to membership rows and the group's messages.
    pub fn delete_group(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM dm_groups WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        destination: Destination,
        content: &str,
        created_at: &str,
    ) -> Result<()> {
        let (channel_id, dm_group_id) = match destination {
            Destination::Channel(cid) => (Some(cid.to_string()), None),
            Destination::DmGroup(gid) => (None, Some(gid.to_string())),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, channel_id, dm_group_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, sender_id, channel_id, dm_group_id, content, created_at),
            )?;
            Ok(())
        })
    }

    /// Ordered history for one destination. The rowid tiebreak keeps
    /// messages with equal timestamps in insertion order.
    pub fn list_messages(
        &self,
        destination: Destination,
        order: MessageOrder,
    ) -> Result<Vec<MessageRow>> {
        let (column, dest_id) = match destination {
            Destination::Channel(cid) => ("channel_id", cid.to_string()),
            Destination::DmGroup(gid) => ("dm_group_id", gid.to_string()),
        };
        let direction = match order {
            MessageOrder::OldestFirst => "ASC",
            MessageOrder::NewestFirst => "DESC",
        };

        // JOIN users to carry sender_username in one query
        let sql = format!(
            "SELECT m.id, m.sender_id, u.username, m.channel_id, m.dm_group_id,
                    m.content, m.created_at
             FROM messages m
             JOIN users u ON m.sender_id = u.id
             WHERE m.{column} = ?1
             ORDER BY m.created_at {direction}, m.rowid {direction}"
        );

        self.with_conn(|conn| {
            let rows = conn
                .prepare(&sql)?
                .query_map([&dest_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn unknown_user_ids(conn: &Connection, ids: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT 1 FROM users WHERE id = ?1")?;
    let mut unknown = Vec::new();
    for id in ids {
        let found = stmt.query_row([id], |_| Ok(())).optional()?;
        if found.is_none() {
            unknown.push(id.clone());
        }
    }
    Ok(unknown)
}

fn member_set(conn: &Connection, group_id: &str) -> Result<BTreeSet<String>> {
    let set = conn
        .prepare("SELECT user_id FROM dm_group_members WHERE group_id = ?1")?
        .query_map([group_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(set)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRow> {
    Ok(WorkspaceRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn map_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        workspace_id: row.get(2)?,
        is_chain: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_dm_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<DmGroupRow> {
    Ok(DmGroupRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        channel_id: row.get(3)?,
        dm_group_id: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, &format!("{username}@example.com"), "hash", &now())
            .unwrap();
        id
    }

    fn seed_channel(db: &Database) -> Uuid {
        let wid = Uuid::new_v4().to_string();
        db.insert_workspace(&wid, "acme", &now()).unwrap();
        let cid = Uuid::new_v4();
        db.insert_channel(&cid.to_string(), "general", &wid, false, &now())
            .unwrap();
        cid
    }

    fn resolve(db: &Database, members: &BTreeSet<String>) -> (String, bool) {
        match db
            .resolve_or_create_group(members, &Uuid::new_v4().to_string(), &now())
            .unwrap()
        {
            ResolveGroup::Existing(g) => (g.id, false),
            ResolveGroup::Created(g) => (g.id, true),
            ResolveGroup::UnknownUsers(ids) => panic!("unexpected unknown users: {ids:?}"),
        }
    }

    #[test]
    fn resolver_is_idempotent_per_member_set() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a");
        let b = seed_user(&db, "b");

        let set: BTreeSet<String> = [a.clone(), b.clone()].into_iter().collect();
        let (first, created) = resolve(&db, &set);
        assert!(created);

        // Same set again, regardless of how the caller assembled it
        let (second, created) = resolve(&db, &set);
        assert!(!created);
        assert_eq!(first, second);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM dm_groups", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn distinct_member_sets_get_distinct_groups() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a");
        let b = seed_user(&db, "b");
        let c = seed_user(&db, "c");

        let ab: BTreeSet<String> = [a.clone(), b.clone()].into_iter().collect();
        let abc: BTreeSet<String> = [a, b, c].into_iter().collect();

        let (g1, _) = resolve(&db, &ab);
        let (g2, _) = resolve(&db, &abc);
        // {a,b} is a subset of {a,b,c} but not the same group
        assert_ne!(g1, g2);
    }

    #[test]
    fn unknown_member_ids_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a");
        let ghost = Uuid::new_v4().to_string();

        let set: BTreeSet<String> = [a, ghost.clone()].into_iter().collect();
        match db
            .resolve_or_create_group(&set, &Uuid::new_v4().to_string(), &now())
            .unwrap()
        {
            ResolveGroup::UnknownUsers(ids) => assert_eq!(ids, vec![ghost]),
            _ => panic!("expected rejection"),
        }

        // Nothing was created
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM dm_groups", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn concurrent_identical_resolves_create_one_group() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = seed_user(&db, "a");
        let b = seed_user(&db, "b");
        let set: BTreeSet<String> = [a, b].into_iter().collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let set = set.clone();
                std::thread::spawn(move || resolve(&db, &set).0)
            })
            .collect();

        let ids: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM dm_groups", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn append_then_list_in_both_orders() {
        let db = Database::open_in_memory().unwrap();
        let sender = seed_user(&db, "a");
        let cid = seed_channel(&db);
        let dest = Destination::Channel(cid);

        for text in ["one", "two", "three"] {
            let ts = db.next_timestamp().unwrap().to_rfc3339();
            db.insert_message(&Uuid::new_v4().to_string(), &sender, dest, text, &ts)
                .unwrap();
        }

        let oldest = db.list_messages(dest, MessageOrder::OldestFirst).unwrap();
        assert_eq!(oldest.last().unwrap().content, "three");
        assert!(oldest.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        let newest = db.list_messages(dest, MessageOrder::NewestFirst).unwrap();
        assert_eq!(newest.first().unwrap().content, "three");
        assert_eq!(newest.last().unwrap().content, "one");
    }

    #[test]
    fn history_is_scoped_to_one_destination() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a");
        let b = seed_user(&db, "b");
        let cid = seed_channel(&db);

        let set: BTreeSet<String> = [a.clone(), b].into_iter().collect();
        let (gid, _) = resolve(&db, &set);
        let gid: Uuid = gid.parse().unwrap();

        let ts = db.next_timestamp().unwrap().to_rfc3339();
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &a,
            Destination::Channel(cid),
            "channel msg",
            &ts,
        )
        .unwrap();
        let ts = db.next_timestamp().unwrap().to_rfc3339();
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &a,
            Destination::DmGroup(gid),
            "dm msg",
            &ts,
        )
        .unwrap();

        let channel = db
            .list_messages(Destination::Channel(cid), MessageOrder::OldestFirst)
            .unwrap();
        assert_eq!(channel.len(), 1);
        assert_eq!(channel[0].content, "channel msg");
        assert_eq!(channel[0].sender_username, "a");

        let dm = db
            .list_messages(Destination::DmGroup(gid), MessageOrder::NewestFirst)
            .unwrap();
        assert_eq!(dm.len(), 1);
        assert_eq!(dm[0].content, "dm msg");
    }

    #[test]
    fn deleting_a_destination_cascades_to_its_messages() {
        let db = Database::open_in_memory().unwrap();
        let sender = seed_user(&db, "a");
        let cid = seed_channel(&db);

        let ts = db.next_timestamp().unwrap().to_rfc3339();
        db.insert_message(
            &Uuid::new_v4().to_string(),
            &sender,
            Destination::Channel(cid),
            "bye",
            &ts,
        )
        .unwrap();

        assert!(db.delete_channel(&cid.to_string()).unwrap());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn chain_listing_filters_on_the_flag() {
        let db = Database::open_in_memory().unwrap();
        let wid = Uuid::new_v4().to_string();
        db.insert_workspace(&wid, "acme", &now()).unwrap();
        db.insert_channel(&Uuid::new_v4().to_string(), "general", &wid, false, &now())
            .unwrap();
        db.insert_channel(&Uuid::new_v4().to_string(), "announcements", &wid, true, &now())
            .unwrap();

        let chain = db.list_chain_channels().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "announcements");
        assert!(chain[0].is_chain);

        assert_eq!(db.list_channels(Some(&wid)).unwrap().len(), 2);
    }
}
