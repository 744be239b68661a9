//! Database schema for the SQLite checkpoint backend

/// SQL schema for the checkpoint database
pub const SCHEMA_SQL: &str = r#"
-- Snapshot metadata (catalog fingerprint, timestamps)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Deduplicated items in first-seen order
CREATE TABLE IF NOT EXISTS items (
    seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    fields TEXT NOT NULL
);

-- One row per distinct (item, selection) pair
CREATE TABLE IF NOT EXISTS associations (
    seq INTEGER PRIMARY KEY,
    item_id TEXT NOT NULL,
    selection TEXT NOT NULL,
    UNIQUE(item_id, selection)
);

CREATE INDEX IF NOT EXISTS idx_associations_item ON associations(item_id);

-- Selection keys of completed subtrees
CREATE TABLE IF NOT EXISTS finished (
    selection TEXT PRIMARY KEY
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["meta", "items", "associations", "finished"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
