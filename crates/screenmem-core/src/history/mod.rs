//! Append-only history log (C4): batched writer with an immediate-DELETE
//! carve-out, and a one-shot column-set migration for schema drift.

mod batch;
mod migration;

pub use batch::BatchWriter;

use crate::error::{Error, Result};
use crate::types::{EventKind, HistoryEvent};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const EXPECTED_COLUMNS: &[&str] =
    &["id", "memory_id", "old_memory", "new_memory", "event", "created_at", "updated_at", "is_deleted", "actor_id", "role"];

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = 10000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<HistoryEvent> {
    let event_str: String = row.get("event")?;
    Ok(HistoryEvent {
        event_id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        old_data: row.get("old_memory")?,
        new_data: row.get("new_memory")?,
        event_kind: event_str.parse().unwrap_or(EventKind::Add),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_deleted: row.get::<_, i64>("is_deleted")? != 0,
        actor_id: row.get("actor_id")?,
        role: row.get("role")?,
    })
}

/// The append-only `history` table, with a bounded in-process queue for
/// non-immediate writes.
pub struct HistoryLog {
    conn: Mutex<Connection>,
    queue: Mutex<std::collections::VecDeque<(HistoryEvent, std::time::Instant)>>,
    batch_size: usize,
}

impl HistoryLog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        migration::reconcile_schema(&conn, EXPECTED_COLUMNS)?;
        Ok(Self { conn: Mutex::new(conn), queue: Mutex::new(std::collections::VecDeque::new()), batch_size: 50 })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        migration::reconcile_schema(&conn, EXPECTED_COLUMNS)?;
        Ok(Self { conn: Mutex::new(conn), queue: Mutex::new(std::collections::VecDeque::new()), batch_size: 50 })
    }

    /// Queue (or, for DELETE/`immediate=true`, write synchronously) a
    /// history row. Size-triggered flush happens inline here; age-triggered
    /// flush is driven by [`BatchWriter`]'s background task.
    pub fn add_history(
        &self,
        memory_id: &str,
        old_data: Option<&str>,
        new_data: Option<&str>,
        event: EventKind,
        actor_id: Option<&str>,
        role: Option<&str>,
        immediate: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let row = HistoryEvent {
            event_id: Uuid::new_v4().to_string(),
            memory_id: memory_id.to_string(),
            old_data: old_data.map(String::from),
            new_data: new_data.map(String::from),
            event_kind: event,
            created_at: now,
            updated_at: Some(now),
            is_deleted: matches!(event, EventKind::Delete),
            actor_id: actor_id.map(String::from),
            role: role.map(String::from),
        };

        if immediate || matches!(event, EventKind::Delete) {
            return self.write_rows(std::slice::from_ref(&row));
        }

        let should_flush = {
            let mut q = self.queue.lock().unwrap();
            q.push_back((row, std::time::Instant::now()));
            q.len() >= self.batch_size
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush queued rows in one transaction; on failure, rollback and retry
    /// once; surfaces the error on a second failure (§4.4).
    pub fn flush(&self) -> Result<usize> {
        let drained: Vec<HistoryEvent> = {
            let mut q = self.queue.lock().unwrap();
            q.drain(..).map(|(e, _)| e).collect()
        };
        if drained.is_empty() {
            return Ok(0);
        }

        match self.write_rows(&drained) {
            Ok(()) => Ok(drained.len()),
            Err(_) => match self.write_rows(&drained) {
                Ok(()) => Ok(drained.len()),
                Err(e) => {
                    // Surface the failure; put the rows back so a later
                    // flush can try again rather than losing them.
                    let mut q = self.queue.lock().unwrap();
                    for row in drained.into_iter().rev() {
                        q.push_front((row, std::time::Instant::now()));
                    }
                    Err(e)
                }
            },
        }
    }

    /// Age, in milliseconds, of the oldest queued entry, if any — consulted
    /// by [`BatchWriter`]'s age-triggered flush.
    pub fn oldest_queued_age_ms(&self) -> Option<u128> {
        let q = self.queue.lock().unwrap();
        q.front().map(|(_, inserted)| inserted.elapsed().as_millis())
    }

    fn write_rows(&self, rows: &[HistoryEvent]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for row in rows {
            tx.execute(
                "INSERT INTO history (id, memory_id, old_memory, new_memory, event, created_at, updated_at, is_deleted, actor_id, role)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    row.event_id,
                    row.memory_id,
                    row.old_data,
                    row.new_data,
                    row.event_kind.to_string(),
                    row.created_at,
                    row.updated_at,
                    row.is_deleted as i64,
                    row.actor_id,
                    row.role,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Rows for one memory, ordered by `(created_at, updated_at)`.
    pub fn get_history(&self, memory_id: &str) -> Result<Vec<HistoryEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM history WHERE memory_id = ?1 ORDER BY created_at ASC, updated_at ASC",
        )?;
        let rows = stmt.query_map(params![memory_id], row_to_event)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn get_by_id(&self, event_id: &str) -> Result<Option<HistoryEvent>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM history WHERE id = ?1", params![event_id], row_to_event).optional().map_err(Error::from)
    }

    pub fn reset(&self) -> Result<()> {
        self.queue.lock().unwrap().clear();
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM history", [])?;
        Ok(())
    }

    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get::<_, i64>(0)).map(|n| n as usize).map_err(Error::from)
    }
}
