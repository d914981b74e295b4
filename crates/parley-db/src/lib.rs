pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
    /// Last timestamp handed out for a message insert. Guards the
    /// "non-decreasing created_at" guarantee against clock steps.
    clock: Mutex<DateTime<Utc>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self::wrap(conn))
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Next message timestamp: wall clock clamped to be >= the last one
    /// assigned, so history order never goes backwards.
    pub fn next_timestamp(&self) -> Result<DateTime<Utc>> {
        let mut last = self
            .clock
            .lock()
            .map_err(|e| anyhow::anyhow!("clock lock poisoned: {}", e))?;
        let now = Utc::now().max(*last);
        *last = now;
        Ok(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_never_decrease() {
        let db = Database::open_in_memory().unwrap();
        let mut prev = db.next_timestamp().unwrap();
        for _ in 0..100 {
            let next = db.next_timestamp().unwrap();
            assert!(next >= prev);
            prev = next;
        }
    }
}
