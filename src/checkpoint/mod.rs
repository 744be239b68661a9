//! Checkpoint store for crawl snapshots
//!
//! The crawler writes the complete state after every finished task, so an
//! interrupted crawl loses at most the tasks that were in flight. Two
//! backends are available:
//! - `json`: a directory with `items.json`, `associations.json` and
//!   `progress.json`
//! - `sqlite`: a single database file

mod json;
mod schema;
mod sqlite;
mod traits;

pub use json::JsonCheckpoint;
pub use sqlite::SqliteCheckpoint;
pub use traits::{CheckpointError, CheckpointResult, CheckpointStore};

use crate::collector::{Collector, CrawlState};
use crate::config::{CheckpointBackend, CheckpointConfig};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// The full crawl state at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Fingerprint of the facet catalog the state was built with
    pub catalog_fingerprint: String,
    pub updated_at: DateTime<Utc>,
    pub state: CrawlState,
}

impl Snapshot {
    pub fn new(catalog_fingerprint: impl Into<String>, state: CrawlState) -> Self {
        Self {
            catalog_fingerprint: catalog_fingerprint.into(),
            updated_at: Utc::now(),
            state,
        }
    }
}

/// Single writer in front of a `CheckpointStore`
///
/// The collector is snapshotted while the store lock is held, so a slower
/// writer can never overwrite a newer snapshot with an older one.
pub struct Checkpointer {
    store: Mutex<Box<dyn CheckpointStore>>,
    catalog_fingerprint: String,
}

impl Checkpointer {
    pub fn new(store: Box<dyn CheckpointStore>, catalog_fingerprint: impl Into<String>) -> Self {
        Self {
            store: Mutex::new(store),
            catalog_fingerprint: catalog_fingerprint.into(),
        }
    }

    /// Writes the collector's current state, replacing the previous snapshot
    pub fn save(&self, collector: &Collector) -> CheckpointResult<()> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Snapshot::new(self.catalog_fingerprint.clone(), collector.snapshot());
        store.save(&snapshot)
    }

    /// Writes the resolved export of the collector's current state
    pub fn export_resolved(&self, collector: &Collector, path: &Path) -> CheckpointResult<()> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Snapshot::new(self.catalog_fingerprint.clone(), collector.snapshot());
        store.export_resolved(&snapshot, path)
    }

    pub fn into_store(self) -> Box<dyn CheckpointStore> {
        self.store.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens the configured checkpoint backend
///
/// # Arguments
///
/// * `config` - The `[checkpoint]` section
///
/// # Returns
///
/// * `Ok(Box<dyn CheckpointStore>)` - The opened store
/// * `Err(CheckpointError)` - The directory or database could not be opened
pub fn open_store(config: &CheckpointConfig) -> CheckpointResult<Box<dyn CheckpointStore>> {
    let path = Path::new(&config.path);
    match config.backend {
        CheckpointBackend::Json => Ok(Box::new(JsonCheckpoint::new(path)?)),
        CheckpointBackend::Sqlite => Ok(Box::new(SqliteCheckpoint::new(path)?)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::SelectedValue;
    use crate::collector::{FilterAssociation, Item};
    use serde_json::{json, Map};

    pub fn key(pairs: &[(&str, &str)]) -> Vec<SelectedValue> {
        pairs
            .iter()
            .map(|(f, v)| SelectedValue {
                facet_title: f.to_string(),
                value_name: v.to_string(),
            })
            .collect()
    }

    /// Two items, three associations, one finished subtree
    pub fn sample_snapshot() -> Snapshot {
        let mut tee = Map::new();
        tee.insert("name".to_string(), json!("Tee"));
        tee.insert("price".to_string(), json!({"value": 120, "currency": "EUR"}));
        let mut jeans = Map::new();
        jeans.insert("name".to_string(), json!("Jeans"));

        let tops = key(&[("Category", "tops")]);
        let tops_red = key(&[("Category", "tops"), ("Color", "red")]);
        let state = CrawlState::from_parts(
            vec![Item::new("A", tee), Item::new("B", jeans)],
            vec![
                FilterAssociation {
                    item_id: "A".to_string(),
                    selection: tops.clone(),
                },
                FilterAssociation {
                    item_id: "A".to_string(),
                    selection: tops_red.clone(),
                },
                FilterAssociation {
                    item_id: "B".to_string(),
                    selection: key(&[("Category", "bottoms")]),
                },
            ],
            vec![tops_red],
        );
        Snapshot::new("abc123", state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_store_per_backend() {
        let dir = TempDir::new().unwrap();

        for (backend, name) in [
            (CheckpointBackend::Json, "json"),
            (CheckpointBackend::Sqlite, "crawl.db"),
        ] {
            let config = CheckpointConfig {
                backend,
                path: dir.path().join(name).to_string_lossy().to_string(),
                resolved_path: None,
            };
            let mut store = open_store(&config).unwrap();
            assert!(store.load().unwrap().is_none());

            let snapshot = test_support::sample_snapshot();
            store.save(&snapshot).unwrap();
            let loaded = store.load().unwrap().unwrap();
            assert_eq!(loaded.state.item_ids(), snapshot.state.item_ids());
        }
    }

    #[test]
    fn test_checkpointer_writes_collector_state() {
        use crate::catalog::FilterSelection;
        use crate::collector::{Item, VolatileFields};

        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(
            Box::new(JsonCheckpoint::new(dir.path()).unwrap()),
            "fp",
        );
        let collector = Collector::new(VolatileFields::default());
        collector.ingest(
            vec![Item::new("A", serde_json::Map::new())],
            &FilterSelection::default(),
        );

        checkpointer.save(&collector).unwrap();
        let loaded = checkpointer.into_store().load().unwrap().unwrap();
        assert_eq!(loaded.catalog_fingerprint, "fp");
        assert_eq!(loaded.state.items().len(), 1);
    }
}
