//! One-shot column-set reconciliation for the `history` table (§4.4).
//!
//! Unlike `storage/migrations.rs`'s ordered version chain, this is a single
//! structural fixpoint: if the live schema's columns already match, nothing
//! happens; otherwise the legacy table is renamed, the current schema is
//! created, the column-wise intersection is copied over, and the legacy
//! table is dropped, all inside one transaction.

use crate::error::Result;
use rusqlite::Connection;

const CURRENT_SCHEMA: &str = "CREATE TABLE history (
    id TEXT PRIMARY KEY,
    memory_id TEXT,
    old_memory TEXT,
    new_memory TEXT,
    event TEXT,
    created_at TEXT,
    updated_at TEXT,
    is_deleted INTEGER,
    actor_id TEXT,
    role TEXT
)";

fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(cols.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Ensure `history` matches `expected_columns`, migrating in place if not.
pub fn reconcile_schema(conn: &Connection, expected_columns: &[&str]) -> Result<()> {
    if !table_exists(conn, "history")? {
        conn.execute_batch(CURRENT_SCHEMA)?;
        return Ok(());
    }

    let existing = existing_columns(conn, "history")?;
    let matches = existing.len() == expected_columns.len()
        && expected_columns.iter().all(|c| existing.iter().any(|e| e == c));
    if matches {
        return Ok(());
    }

    let intersection: Vec<&str> = expected_columns.iter().filter(|c| existing.iter().any(|e| e == *c)).copied().collect();
    let column_list = intersection.join(", ");

    // SAFETY: table/column names here are fixed constants defined in this
    // module, never user input, so string interpolation into SQL is safe.
    let conn_mut = conn.unchecked_transaction()?;
    conn_mut.execute_batch("ALTER TABLE history RENAME TO history_legacy")?;
    conn_mut.execute_batch(CURRENT_SCHEMA)?;
    if !intersection.is_empty() {
        conn_mut.execute(
            &format!("INSERT INTO history ({column_list}) SELECT {column_list} FROM history_legacy"),
            [],
        )?;
    }
    conn_mut.execute_batch("DROP TABLE history_legacy")?;
    conn_mut.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_schema_when_table_absent() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile_schema(&conn, super::super::EXPECTED_COLUMNS).unwrap();
        let cols = existing_columns(&conn, "history").unwrap();
        assert_eq!(cols.len(), 10);
    }

    #[test]
    fn is_a_fixpoint_on_an_already_current_schema() {
        let conn = Connection::open_in_memory().unwrap();
        reconcile_schema(&conn, super::super::EXPECTED_COLUMNS).unwrap();
        reconcile_schema(&conn, super::super::EXPECTED_COLUMNS).unwrap();
        let cols = existing_columns(&conn, "history").unwrap();
        assert_eq!(cols.len(), 10);
    }

    #[test]
    fn migrates_legacy_schema_preserving_intersecting_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE history (id TEXT PRIMARY KEY, memory_id TEXT, old_memory TEXT, event TEXT)",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO history (id, memory_id, old_memory, event) VALUES ('e1', 'm1', 'old', 'ADD')",
            [],
        )
        .unwrap();

        reconcile_schema(&conn, super::super::EXPECTED_COLUMNS).unwrap();

        let cols = existing_columns(&conn, "history").unwrap();
        assert_eq!(cols.len(), 10);
        let memory_id: String = conn.query_row("SELECT memory_id FROM history WHERE id = 'e1'", [], |r| r.get(0)).unwrap();
        assert_eq!(memory_id, "m1");
    }
}
