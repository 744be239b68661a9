//! SQLite checkpoint backend
//!
//! Each save rewrites every table inside one transaction, so a reader sees
//! either the previous snapshot or the new one.

use crate::catalog::SelectionKey;
use crate::checkpoint::schema::initialize_schema;
use crate::checkpoint::traits::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::checkpoint::Snapshot;
use crate::collector::{CrawlState, FilterAssociation, Item};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

const FINGERPRINT_KEY: &str = "catalog_fingerprint";
const UPDATED_AT_KEY: &str = "updated_at";

/// SQLite checkpoint store
pub struct SqliteCheckpoint {
    conn: Connection,
}

impl SqliteCheckpoint {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> CheckpointResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> CheckpointResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn meta(&self, key: &str) -> CheckpointResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn load_items(&self) -> CheckpointResult<Vec<Item>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM items ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, fields) = row?;
            let fields: Map<String, Value> = serde_json::from_str(&fields)?;
            items.push(Item::new(id, fields));
        }
        Ok(items)
    }

    fn load_associations(&self) -> CheckpointResult<Vec<FilterAssociation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT item_id, selection FROM associations ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut associations = Vec::new();
        for row in rows {
            let (item_id, selection) = row?;
            associations.push(FilterAssociation {
                item_id,
                selection: serde_json::from_str(&selection)?,
            });
        }
        Ok(associations)
    }

    fn load_finished(&self) -> CheckpointResult<Vec<SelectionKey>> {
        let mut stmt = self.conn.prepare("SELECT selection FROM finished")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut finished = Vec::new();
        for row in rows {
            finished.push(serde_json::from_str(&row?)?);
        }
        Ok(finished)
    }
}

impl CheckpointStore for SqliteCheckpoint {
    fn load(&self) -> CheckpointResult<Option<Snapshot>> {
        let Some(catalog_fingerprint) = self.meta(FINGERPRINT_KEY)? else {
            return Ok(None);
        };
        let updated_at = match self.meta(UPDATED_AT_KEY)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| CheckpointError::Corrupt(format!("updated_at '{}': {}", raw, e)))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let state = CrawlState::from_parts(
            self.load_items()?,
            self.load_associations()?,
            self.load_finished()?,
        );

        Ok(Some(Snapshot {
            catalog_fingerprint,
            updated_at,
            state,
        }))
    }

    fn save(&mut self, snapshot: &Snapshot) -> CheckpointResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch("DELETE FROM items; DELETE FROM associations; DELETE FROM finished;")?;

        {
            let mut insert_item =
                tx.prepare("INSERT INTO items (seq, id, fields) VALUES (?1, ?2, ?3)")?;
            for (seq, item) in snapshot.state.items().iter().enumerate() {
                let fields = serde_json::to_string(&item.fields)?;
                insert_item.execute(params![seq as i64, item.id, fields])?;
            }

            let mut insert_association = tx.prepare(
                "INSERT INTO associations (seq, item_id, selection) VALUES (?1, ?2, ?3)",
            )?;
            for (seq, association) in snapshot.state.associations().iter().enumerate() {
                let selection = serde_json::to_string(&association.selection)?;
                insert_association.execute(params![seq as i64, association.item_id, selection])?;
            }

            let mut insert_finished = tx.prepare("INSERT INTO finished (selection) VALUES (?1)")?;
            for key in snapshot.state.finished() {
                insert_finished.execute([serde_json::to_string(key)?])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![FINGERPRINT_KEY, snapshot.catalog_fingerprint],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![UPDATED_AT_KEY, snapshot.updated_at.to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        self.conn.execute_batch(
            "DELETE FROM meta; DELETE FROM items; DELETE FROM associations; DELETE FROM finished;",
        )?;
        Ok(())
    }
}
