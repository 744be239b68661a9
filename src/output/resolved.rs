//! Resolved export
//!
//! Joins items with their associations: each exported item carries every
//! selection it was seen under and the distinct facet/value pairs across
//! those selections.

use crate::catalog::{SelectedValue, SelectionKey};
use crate::checkpoint::CheckpointResult;
use crate::collector::CrawlState;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;

/// Builds one JSON object per item, in first-seen order
pub fn resolve(state: &CrawlState) -> Vec<Value> {
    let mut selections: HashMap<&str, Vec<&SelectionKey>> = HashMap::new();
    for association in state.associations() {
        selections
            .entry(association.item_id.as_str())
            .or_default()
            .push(&association.selection);
    }

    state
        .items()
        .iter()
        .map(|item| {
            let paths = selections.remove(item.id.as_str()).unwrap_or_default();
            let filters: BTreeSet<&SelectedValue> = paths.iter().flat_map(|p| p.iter()).collect();

            let mut object = item.fields.clone();
            object.insert("id".to_string(), Value::String(item.id.clone()));
            object.insert("selections".to_string(), serde_json::json!(paths));
            object.insert("filters".to_string(), serde_json::json!(filters));
            Value::Object(object)
        })
        .collect()
}

/// Writes the resolved export to `path`
pub fn write_resolved(state: &CrawlState, path: &Path) -> CheckpointResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let bytes = serde_json::to_vec_pretty(&resolve(state))?;
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;

    tracing::info!(
        "Wrote {} resolved items to {}",
        state.items().len(),
        path.display()
    );
    Ok(())
}
