//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The aggregator, rules and materializer call store methods; they never
//! execute SQL directly.

use crate::{
    error::SecurityResult,
    event::PipelineLogEntry,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection};
use std::cell::Cell;
use uuid::Uuid;

mod credit;
mod disbursement;
mod event;
mod location;
mod monitoring;
mod profile;

pub use event::EventFilter;
pub use monitoring::UnmonitorCounts;
pub use profile::ProfileCounts;

pub struct SecurityStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    savepoint_depth: Cell<u32>,
}

impl SecurityStore {
    pub fn open(path: &str) -> SecurityResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            savepoint_depth: Cell::new(0),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SecurityResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            savepoint_depth: Cell::new(0),
        })
    }

    /// Where the database lives, `None` for in-memory stores.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SecurityResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_profiles.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_records.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_events.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    /// Run `f` inside a savepoint. `Ok` releases it, `Err` rolls every write
    /// made by `f` back. Savepoints nest, so a batch, a record and an event
    /// can each be atomic on their own.
    pub fn atomic<T, F>(&self, f: F) -> SecurityResult<T>
    where
        F: FnOnce(&Self) -> SecurityResult<T>,
    {
        let depth = self.savepoint_depth.get();
        let name = format!("sp_{depth}");
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        self.savepoint_depth.set(depth + 1);

        let result = f(self);
        self.savepoint_depth.set(depth);

        match result {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name};"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
                {
                    log::error!("rollback of savepoint {name} failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, version: &str, started_at: DateTime<Utc>) -> SecurityResult<String> {
        let run_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO run (run_id, version, started_at) VALUES (?1, ?2, ?3)",
            params![run_id, version, started_at.timestamp()],
        )?;
        Ok(run_id)
    }

    pub fn finish_run(&self, run_id: &str, finished_at: DateTime<Utc>) -> SecurityResult<()> {
        self.conn.execute(
            "UPDATE run SET finished_at = ?2 WHERE run_id = ?1",
            params![run_id, finished_at.timestamp()],
        )?;
        Ok(())
    }

    // ── Pipeline log ───────────────────────────────────────────

    pub fn append_log(&self, entry: &PipelineLogEntry) -> SecurityResult<()> {
        self.conn.execute(
            "INSERT INTO pipeline_log (run_id, batch, stage, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.batch as i64,
                entry.stage,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn log_for_run(&self, run_id: &str) -> SecurityResult<Vec<PipelineLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, batch, stage, event_type, payload
             FROM pipeline_log WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(PipelineLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    batch:      row.get::<_, i64>(2)? as u64,
                    stage:      row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Column helpers ─────────────────────────────────────────────

pub(crate) fn to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

pub(crate) fn timestamp_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

pub(crate) fn date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn enum_col<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or(rusqlite::Error::InvalidColumnType(idx, raw, Type::Text))
}

pub(crate) fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}
