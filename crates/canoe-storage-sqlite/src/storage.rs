use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use canoe_core::TicketId;
use canoe_storage::{etag_of, SnapshotStore, StorageError, StoredSnapshot};

pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

/// Open a database file and apply the schema.
pub(crate) fn open_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    let init_sql = include_str!("../migrations/0001_init.sql");
    conn.execute_batch(init_sql).with_context(|| "apply sqlite schema")?;
    Ok(conn)
}

fn backend(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl SqliteSnapshotStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self { conn: Mutex::new(open_db(db_path)?) })
    }

    fn current_etag(conn: &Connection, ticket_id: &TicketId) -> Result<Option<String>, StorageError> {
        conn.query_row("SELECT etag FROM snapshots WHERE ticket_id=?1", params![ticket_id.as_str()], |r| r.get(0))
            .optional()
            .map_err(backend)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn get(&self, ticket_id: &TicketId) -> Result<Option<StoredSnapshot>, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT body, etag FROM snapshots WHERE ticket_id=?1",
            params![ticket_id.as_str()],
            |r| Ok(StoredSnapshot { bytes: r.get(0)?, etag: r.get(1)? }),
        )
        .optional()
        .map_err(backend)
    }

    fn put(&self, ticket_id: &TicketId, bytes: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO snapshots(ticket_id, body, etag, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ticket_id) DO UPDATE SET body=excluded.body, etag=excluded.etag, updated_at=excluded.updated_at",
            params![ticket_id.as_str(), bytes, etag_of(bytes), now_unix()],
        )
        .map_err(backend)?;
        debug!(%ticket_id, bytes = bytes.len(), "snapshot stored");
        Ok(())
    }

    fn compare_and_put(&self, ticket_id: &TicketId, expected: Option<&str>, bytes: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let etag = etag_of(bytes);
        let changed = match expected {
            None => conn.execute(
                "INSERT OR IGNORE INTO snapshots(ticket_id, body, etag, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![ticket_id.as_str(), bytes, etag, now_unix()],
            ),
            Some(prev) => conn.execute(
                "UPDATE snapshots SET body=?2, etag=?3, updated_at=?4 WHERE ticket_id=?1 AND etag=?5",
                params![ticket_id.as_str(), bytes, etag, now_unix(), prev],
            ),
        }
        .map_err(backend)?;

        if changed == 0 {
            let actual = Self::current_etag(&conn, ticket_id)?;
            return Err(StorageError::Conflict {
                ticket_id: ticket_id.clone(),
                expected: expected.map(str::to_string),
                actual,
            });
        }
        debug!(%ticket_id, bytes = bytes.len(), "snapshot stored conditionally");
        Ok(())
    }

    fn compare_and_delete(&self, ticket_id: &TicketId, expected: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM snapshots WHERE ticket_id=?1 AND etag=?2", params![ticket_id.as_str(), expected])
            .map_err(backend)?;
        if changed == 0 {
            let actual = Self::current_etag(&conn, ticket_id)?;
            return Err(StorageError::Conflict {
                ticket_id: ticket_id.clone(),
                expected: Some(expected.to_string()),
                actual,
            });
        }
        debug!(%ticket_id, "snapshot removed");
        Ok(())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(1) FROM snapshots", [], |r| r.get(0)).map_err(backend)?;
        Ok(n as usize)
    }
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
