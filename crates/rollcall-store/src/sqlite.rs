//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceLog, FailureReason, Session, SessionReport, SupervisorState};
use rollcall_util::SessionId;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{AttendanceStore, SessionRecord, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
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
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Attendance samples (append-only)
            CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                title TEXT NOT NULL,
                session_start TEXT NOT NULL,
                taken_at TEXT NOT NULL,
                present_json TEXT NOT NULL
            );

            -- One row per supervisor run
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                start TEXT NOT NULL,
                end TEXT NOT NULL,
                join_link TEXT NOT NULL,
                final_state TEXT NOT NULL,
                failure_json TEXT,
                entries_posted INTEGER NOT NULL,
                samples_taken INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_recorded ON sessions(recorded_at);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn parse_session_id(value: &str) -> StoreResult<SessionId> {
    Uuid::parse_str(value)
        .map(SessionId::from_uuid)
        .map_err(|e| StoreError::Serialization(format!("bad session id '{}': {}", value, e)))
}

impl AttendanceStore for SqliteStore {
    fn record_attendance(&self, session: &Session, log: &AttendanceLog) -> StoreResult<()> {
        let conn = self.conn()?;
        let present_json = serde_json::to_string(&log.present)?;

        conn.execute(
            r#"
            INSERT INTO attendance (session_id, title, session_start, taken_at, present_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                session.id().to_string(),
                session.title(),
                session.start().to_rfc3339(),
                log.taken_at.to_rfc3339(),
                present_json
            ],
        )?;

        debug!(
            session_id = %session.id(),
            present = log.present.len(),
            "Attendance recorded"
        );
        Ok(())
    }

    fn record_session(&self, report: &SessionReport) -> StoreResult<()> {
        let conn = self.conn()?;
        let session = &report.session;
        let final_state = serde_json::to_string(&report.final_state)?;
        let failure_json = report
            .failure
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO sessions (
                session_id, title, start, end, join_link, final_state,
                failure_json, entries_posted, samples_taken, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                final_state = excluded.final_state,
                failure_json = excluded.failure_json,
                entries_posted = excluded.entries_posted,
                samples_taken = excluded.samples_taken,
                recorded_at = excluded.recorded_at
            "#,
            params![
                session.id().to_string(),
                session.title(),
                session.start().to_rfc3339(),
                session.end().to_rfc3339(),
                session.join_link(),
                final_state,
                failure_json,
                report.entries_posted as i64,
                report.attendance.len() as i64,
                rollcall_util::now().to_rfc3339()
            ],
        )?;

        debug!(
            session_id = %session.id(),
            final_state = %report.final_state,
            "Session outcome recorded"
        );
        Ok(())
    }

    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, title, start, end, join_link, final_state,
                   failure_json, entries_posted, samples_taken, recorded_at
            FROM sessions ORDER BY recorded_at DESC, rowid DESC LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, title, start, end, join_link, state, failure, posted, taken, recorded) = row?;
            let final_state: SupervisorState = serde_json::from_str(&state)?;
            let failure: Option<FailureReason> =
                failure.map(|f| serde_json::from_str(&f)).transpose()?;

            records.push(SessionRecord {
                session_id: parse_session_id(&id)?,
                title,
                start: parse_timestamp(&start)?,
                end: parse_timestamp(&end)?,
                join_link,
                final_state,
                failure,
                entries_posted: posted.max(0) as usize,
                samples_taken: taken.max(0) as usize,
                recorded_at: parse_timestamp(&recorded)?,
            });
        }

        Ok(records)
    }

    fn attendance_for(&self, session_id: &SessionId) -> StoreResult<Vec<AttendanceLog>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT taken_at, present_json FROM attendance WHERE session_id = ? ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([session_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (taken_at, present_json) = row?;
            let present: Vec<String> = serde_json::from_str(&present_json)?;
            logs.push(AttendanceLog::new(parse_timestamp(&taken_at)?, present));
        }

        Ok(logs)
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
