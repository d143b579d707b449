//! Append-at-head verification log with a fixed retention cap.
//!
//! The whole log is stored as one JSON array under a single key in a small
//! key-value table, ordered most-recent-first. Writes are synchronous and
//! single-writer-assumed; overlapping appends from one process serialize on
//! the connection mutex.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use veriface_core::VerificationLogEntry;

/// Key under which the serialized log array lives.
const STORAGE_KEY: &str = "verification_logs";

/// Maximum retained entries; older ones fall off the tail.
pub const LEDGER_CAP: usize = 50;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger storage: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("ledger serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable, bounded, most-recent-first record of verification attempts.
#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    /// Open the ledger database at `path`, creating file and parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Ephemeral in-memory ledger.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert `entry` at the head, trimming the tail past [`LEDGER_CAP`].
    pub fn append(&self, entry: VerificationLogEntry) -> Result<(), LedgerError> {
        let conn = self.lock_conn();
        let mut entries = read_entries(&conn)?;
        entries.insert(0, entry);
        entries.truncate(LEDGER_CAP);
        let payload = serde_json::to_string(&entries)?;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![STORAGE_KEY, payload],
        )?;
        Ok(())
    }

    /// All retained entries, most recent first. A ledger that has never
    /// been written to lists as empty.
    pub fn list(&self) -> Result<Vec<VerificationLogEntry>, LedgerError> {
        let conn = self.lock_conn();
        read_entries(&conn)
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<(), LedgerError> {
        let conn = self.lock_conn();
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![STORAGE_KEY])?;
        Ok(())
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A missing row lists as empty. So does a row that no longer parses:
/// corrupt history is not worth failing verification over.
fn read_entries(conn: &Connection) -> Result<Vec<VerificationLogEntry>, LedgerError> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![STORAGE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    let Some(payload) = payload else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&payload) {
        Ok(entries) => Ok(entries),
        Err(err) => {
            tracing::warn!(error = %err, "ledger payload unreadable, treating as empty");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriface_core::{DeviceInfo, VerificationLogEntry, VerificationOutcome};

    fn entry(officer: &str) -> VerificationLogEntry {
        VerificationLogEntry::record(
            VerificationOutcome::unreachable("no backend in test"),
            Some(officer.to_string()),
            None,
            DeviceInfo::new("test-agent"),
        )
    }

    fn officer(e: &VerificationLogEntry) -> &str {
        e.officer_id.as_deref().unwrap()
    }

    #[test]
    fn test_list_empty_before_first_append() {
        let ledger = Ledger::open_in_memory().unwrap();
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn test_append_orders_most_recent_first() {
        let ledger = Ledger::open_in_memory().unwrap();
        for i in 0..3 {
            ledger.append(entry(&format!("officer_{i}"))).unwrap();
        }
        let entries = ledger.list().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(officer(&entries[0]), "officer_2");
        assert_eq!(officer(&entries[2]), "officer_0");
    }

    #[test]
    fn test_cap_drops_oldest_entries() {
        let ledger = Ledger::open_in_memory().unwrap();
        for i in 0..=50 {
            ledger.append(entry(&format!("officer_{i}"))).unwrap();
        }
        let entries = ledger.list().unwrap();
        assert_eq!(entries.len(), LEDGER_CAP);
        assert_eq!(officer(&entries[0]), "officer_50");
        assert!(entries.iter().all(|e| officer(e) != "officer_0"));
    }

    #[test]
    fn test_clear_removes_everything() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.append(entry("officer_a")).unwrap();
        ledger.append(entry("officer_b")).unwrap();
        ledger.clear().unwrap();
        assert!(ledger.list().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_payload_lists_as_empty() {
        let ledger = Ledger::open_in_memory().unwrap();
        {
            let conn = ledger.lock_conn();
            conn.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)",
                params![STORAGE_KEY, "{not json"],
            )
            .unwrap();
        }
        assert!(ledger.list().unwrap().is_empty());
        // And the ledger stays writable afterwards.
        ledger.append(entry("officer_after")).unwrap();
        assert_eq!(ledger.list().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let head_id;
        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.append(entry("officer_x")).unwrap();
            ledger.append(entry("officer_y")).unwrap();
            head_id = ledger.list().unwrap()[0].id.clone();
        }
        let ledger = Ledger::open(&path).unwrap();
        let entries = ledger.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, head_id);
        assert_eq!(officer(&entries[0]), "officer_y");
    }
}
