use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use super::{Identity, IdentityRecord};
use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    activity_id TEXT PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);
";

/// Identity records persisted in SQLite.
///
/// Thread-safe via internal `Mutex<Connection>`.
pub struct SqliteIdentity {
    conn: Mutex<Connection>,
}

impl SqliteIdentity {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Identity for SqliteIdentity {
    fn lookup(&self, activity_id: &str) -> Result<Option<String>> {
        let found = self
            .conn
            .lock()
            .query_row(
                "SELECT external_id FROM identities WHERE activity_id = ?1",
                params![activity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found)
    }

    fn associate(&self, activity_id: &str, external_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM identities WHERE external_id = ?1 AND activity_id != ?2",
            params![external_id, activity_id],
        )?;
        tx.execute(
            "INSERT INTO identities (activity_id, external_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(activity_id) DO UPDATE
             SET external_id = excluded.external_id, created_at = excluded.created_at",
            params![activity_id, external_id, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove_external(&self, external_id: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM identities WHERE external_id = ?1",
            params![external_id],
        )?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<IdentityRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT activity_id, external_id, created_at FROM identities ORDER BY created_at, activity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentityRecord {
                activity_id: row.get(0)?,
                external_id: row.get(1)?,
                created_at: parse_dt(&row.get::<_, String>(2)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
