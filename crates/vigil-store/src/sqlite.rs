//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use vigil_util::ParticipantId;

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                participant_id TEXT,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_participant ON audit_log(participant_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn query_audits<P: Params>(&self, sql: &str, params: P) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt.query_map(params, |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| vigil_util::now());
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;
        let participant = event.event.participant_id().map(|p| p.as_str().to_string());

        conn.execute(
            "INSERT INTO audit_log (timestamp, participant_id, event_json) VALUES (?, ?, ?)",
            params![event.timestamp.to_rfc3339(), participant, event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        self.query_audits(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
            params![limit as i64],
        )
    }

    fn get_participant_audits(
        &self,
        participant_id: &ParticipantId,
        limit: usize,
    ) -> StoreResult<Vec<AuditEvent>> {
        self.query_audits(
            "SELECT id, timestamp, event_json FROM audit_log \
             WHERE participant_id = ? ORDER BY id DESC LIMIT ?",
            params![participant_id.as_str(), limit as i64],
        )
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
