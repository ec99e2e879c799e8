//! SQLite-backed payload table for [`Memory`] rows.
//!
//! Generalized from the teacher's `storage/sqlite.rs::Storage::new`/
//! `configure_connection` idiom: a `Mutex<Connection>` with the same
//! performance PRAGMA block, but storing the spec's `Memory` schema instead
//! of the FSRS `knowledge_nodes` schema. Vectors are persisted as JSON
//! arrays alongside the row so the table remains the single source of truth
//! even if the ANN index is rebuilt from scratch.

use crate::error::{Error, Result};
use crate::types::{Category, Memory, MemoryMetadata, ScopeIds, Tier};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::Mutex;

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            hash TEXT NOT NULL,
            text_vector TEXT NOT NULL,
            vision_vector TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            tier TEXT NOT NULL,
            importance_score REAL NOT NULL DEFAULT 0.0,
            compressed INTEGER NOT NULL DEFAULT 0,
            user_id TEXT,
            agent_id TEXT,
            run_id TEXT,
            category TEXT NOT NULL,
            actor_id TEXT,
            role TEXT,
            metadata TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_hash ON memories(hash);
        CREATE INDEX IF NOT EXISTS idx_memories_scope ON memories(user_id, agent_id, run_id);
        CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);",
    )?;
    Ok(())
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let text_vector_json: String = row.get("text_vector")?;
    let vision_vector_json: Option<String> = row.get("vision_vector")?;
    let tier_str: String = row.get("tier")?;
    let category_str: String = row.get("category")?;
    let metadata_json: String = row.get("metadata")?;

    let text_vector: Vec<f32> = serde_json::from_str(&text_vector_json).unwrap_or_default();
    let vision_vector = vision_vector_json.and_then(|s| serde_json::from_str(&s).ok());
    let metadata: MemoryMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();

    Ok(Memory {
        id: row.get("id")?,
        data: row.get("data")?,
        hash: row.get("hash")?,
        text_vector,
        vision_vector,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        access_count: row.get::<_, i64>("access_count")? as u64,
        tier: tier_str.parse().unwrap_or(Tier::LongTerm),
        importance_score: row.get("importance_score")?,
        compressed: row.get::<_, i64>("compressed")? != 0,
        scope_ids: ScopeIds { user_id: row.get("user_id")?, agent_id: row.get("agent_id")?, run_id: row.get("run_id")? },
        category: category_str.parse().unwrap_or_default(),
        actor_id: row.get("actor_id")?,
        role: row.get("role")?,
        metadata,
    })
}

/// A conjunctive exact-match filter over scalar payload fields.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    pub tier: Option<Tier>,
    pub category: Option<Category>,
}

impl MemoryFilter {
    pub fn matches(&self, m: &Memory) -> bool {
        self.user_id.as_deref().is_none_or(|v| m.scope_ids.user_id.as_deref() == Some(v))
            && self.agent_id.as_deref().is_none_or(|v| m.scope_ids.agent_id.as_deref() == Some(v))
            && self.run_id.as_deref().is_none_or(|v| m.scope_ids.run_id.as_deref() == Some(v))
            && self.tier.is_none_or(|t| m.tier == t)
            && self.category.is_none_or(|c| m.category == c)
    }
}

/// The payload table.
pub struct MemoryTable {
    conn: Mutex<Connection>,
}

impl MemoryTable {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        create_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        create_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn insert(&self, m: &Memory) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memories (id, data, hash, text_vector, vision_vector, created_at, updated_at,
                access_count, tier, importance_score, compressed, user_id, agent_id, run_id, category,
                actor_id, role, metadata)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                m.id,
                m.data,
                m.hash,
                serde_json::to_string(&m.text_vector)?,
                m.vision_vector.as_ref().map(serde_json::to_string).transpose()?,
                m.created_at,
                m.updated_at,
                m.access_count as i64,
                m.tier.to_string(),
                m.importance_score,
                m.compressed as i64,
                m.scope_ids.user_id,
                m.scope_ids.agent_id,
                m.scope_ids.run_id,
                m.category.to_string(),
                m.actor_id,
                m.role,
                serde_json::to_string(&m.metadata)?,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Memory> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Idempotent: deleting a missing id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn replace(&self, m: &Memory) -> Result<()> {
        self.delete(&m.id)?;
        self.insert(m)
    }

    pub fn bump_access(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET access_count = access_count + 1, updated_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_tier(&self, id: &str, tier: Tier) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE memories SET tier = ?2 WHERE id = ?1", params![id, tier.to_string()])?;
        if changed == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], row_to_memory)?;
        let mut out = Vec::new();
        for row in rows {
            let m = row?;
            if filter.matches(&m) {
                out.push(m);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Fetch many rows by id, in the order given by the ANN search, for
    /// filter evaluation after a candidate set is retrieved.
    pub fn get_many(&self, ids: &[String]) -> Result<HashMap<String, Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(m) = stmt.query_row(params![id], row_to_memory).optional()? {
                out.insert(id.clone(), m);
            }
        }
        Ok(out)
    }

    /// Scan every memory; used for C7's mandatory cold-start tier/access
    /// map seeding.
    pub fn scan_all(&self) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn reset(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM memories", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryMetadata, ScopeIds};

    fn sample(id: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.to_string(),
            data: "hello world".into(),
            hash: Memory::digest("hello world"),
            text_vector: vec![0.1, 0.2],
            vision_vector: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            tier: Tier::Working,
            importance_score: 0.5,
            compressed: false,
            scope_ids: ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None },
            category: Category::General,
            actor_id: None,
            role: None,
            metadata: MemoryMetadata::default(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let table = MemoryTable::open_in_memory().unwrap();
        table.insert(&sample("m1")).unwrap();
        let fetched = table.get("m1").unwrap();
        assert_eq!(fetched.data, "hello world");
        assert_eq!(fetched.text_vector, vec![0.1, 0.2]);
    }

    #[test]
    fn get_missing_is_not_found() {
        let table = MemoryTable::open_in_memory().unwrap();
        assert!(matches!(table.get("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_missing_is_idempotent() {
        let table = MemoryTable::open_in_memory().unwrap();
        table.delete("missing").unwrap();
    }

    #[test]
    fn list_applies_conjunctive_filter() {
        let table = MemoryTable::open_in_memory().unwrap();
        table.insert(&sample("m1")).unwrap();
        let mut other = sample("m2");
        other.scope_ids.user_id = Some("u2".into());
        table.insert(&other).unwrap();

        let filter = MemoryFilter { user_id: Some("u1".into()), ..Default::default() };
        let results = table.list(&filter, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
    }

    #[test]
    fn bump_access_increments_and_touches_updated_at() {
        let table = MemoryTable::open_in_memory().unwrap();
        table.insert(&sample("m1")).unwrap();
        table.bump_access("m1", Utc::now()).unwrap();
        assert_eq!(table.get("m1").unwrap().access_count, 1);
    }
}
