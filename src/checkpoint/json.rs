//! Directory-of-JSON-files checkpoint backend
//!
//! `progress.json` is written last and acts as the commit marker: a snapshot
//! without it is treated as absent. Since state only grows, a crash between
//! the renames leaves newer items next to older progress, which resumes
//! safely.

use crate::catalog::SelectionKey;
use crate::checkpoint::traits::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::checkpoint::Snapshot;
use crate::collector::{CrawlState, FilterAssociation, Item};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const ITEMS_FILE: &str = "items.json";
const ASSOCIATIONS_FILE: &str = "associations.json";
const PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Serialize, Deserialize)]
struct Progress {
    catalog_fingerprint: String,
    updated_at: DateTime<Utc>,
    item_count: usize,
    association_count: usize,
    finished: Vec<SelectionKey>,
}

/// Stores snapshots as pretty-printed JSON files in one directory
pub struct JsonCheckpoint {
    dir: PathBuf,
}

impl JsonCheckpoint {
    pub fn new(dir: &Path) -> CheckpointResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write JSON atomically (write to temp, then rename)
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CheckpointResult<()> {
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(value)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read JSON, returning None if the file doesn't exist
    fn read_json<T: DeserializeOwned>(&self, name: &str) -> CheckpointResult<Option<T>> {
        match fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Io(e)),
        }
    }
}

impl CheckpointStore for JsonCheckpoint {
    fn load(&self) -> CheckpointResult<Option<Snapshot>> {
        let Some(progress) = self.read_json::<Progress>(PROGRESS_FILE)? else {
            return Ok(None);
        };

        let items: Vec<Item> = self.read_json(ITEMS_FILE)?.ok_or_else(|| {
            CheckpointError::Corrupt(format!("{} is missing", ITEMS_FILE))
        })?;
        let associations: Vec<FilterAssociation> =
            self.read_json(ASSOCIATIONS_FILE)?.ok_or_else(|| {
                CheckpointError::Corrupt(format!("{} is missing", ASSOCIATIONS_FILE))
            })?;

        if items.len() < progress.item_count {
            return Err(CheckpointError::Corrupt(format!(
                "{} holds {} items, progress expects at least {}",
                ITEMS_FILE,
                items.len(),
                progress.item_count
            )));
        }

        tracing::debug!(
            "Loaded checkpoint from {}: {} items, {} associations",
            self.dir.display(),
            items.len(),
            associations.len()
        );

        Ok(Some(Snapshot {
            catalog_fingerprint: progress.catalog_fingerprint,
            updated_at: progress.updated_at,
            state: CrawlState::from_parts(items, associations, progress.finished),
        }))
    }

    fn save(&mut self, snapshot: &Snapshot) -> CheckpointResult<()> {
        let state = &snapshot.state;
        self.write_json(ITEMS_FILE, state.items())?;
        self.write_json(ASSOCIATIONS_FILE, state.associations())?;
        self.write_json(
            PROGRESS_FILE,
            &Progress {
                catalog_fingerprint: snapshot.catalog_fingerprint.clone(),
                updated_at: snapshot.updated_at,
                item_count: state.items().len(),
                association_count: state.associations().len(),
                finished: state.finished().iter().cloned().collect(),
            },
        )
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        // progress first so a half-cleared directory reads as empty
        for name in [PROGRESS_FILE, ITEMS_FILE, ASSOCIATIONS_FILE] {
            match fs::remove_file(self.path(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
