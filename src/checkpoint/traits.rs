//! Checkpoint store trait and error types

use crate::checkpoint::Snapshot;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading or writing snapshots
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// A durable home for crawl snapshots
///
/// Every `save` replaces the previous snapshot as a whole. Implementations do
/// not need to be `Sync`: the crawler serializes all access behind one lock.
pub trait CheckpointStore: Send {
    /// Reads the latest snapshot, or `None` if nothing was saved yet
    fn load(&self) -> CheckpointResult<Option<Snapshot>>;

    /// Replaces the stored snapshot with `snapshot`
    fn save(&mut self, snapshot: &Snapshot) -> CheckpointResult<()>;

    /// Removes every stored snapshot
    fn clear(&mut self) -> CheckpointResult<()>;

    /// Writes `snapshot` as resolved items (each item with its selections and
    /// filters merged in) to `path`
    fn export_resolved(&self, snapshot: &Snapshot, path: &Path) -> CheckpointResult<()> {
        crate::output::write_resolved(&snapshot.state, path)
    }
}
