//! Item collector and deduplicator
//!
//! Leaf extraction only reveals that an item belongs to one filter path at a
//! time. The collector turns those redundant sightings into one deduplicated
//! catalog plus, per item, every path it was seen under.
//!
//! All mutation goes through one mutex so concurrent workers cannot break the
//! dedup invariants.

mod item;
mod state;

pub use item::{FilterAssociation, Item, VolatileFields};
pub use state::CrawlState;

use crate::catalog::{FilterSelection, SelectionKey};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A stable-field divergence between two sightings of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub item_id: String,
    pub fields: Vec<String>,
    pub selection: String,
}

/// What one `ingest` call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub seen: usize,
    pub new_items: usize,
    pub new_associations: usize,
    pub skipped_without_id: usize,
    pub mismatches: Vec<FieldMismatch>,
}

/// Owned, mutex-guarded crawl state shared by all workers
#[derive(Debug)]
pub struct Collector {
    state: Mutex<CrawlState>,
    volatile: VolatileFields,
}

impl Collector {
    pub fn new(volatile: VolatileFields) -> Self {
        Self::with_state(CrawlState::new(), volatile)
    }

    /// Starts from a previously checkpointed state
    pub fn with_state(state: CrawlState, volatile: VolatileFields) -> Self {
        Self {
            state: Mutex::new(state),
            volatile,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges extracted items seen under `selection`
    ///
    /// For each item:
    /// 1. Unknown id: stored as a new item.
    /// 2. Known id: stable fields are compared with the first sighting; a
    ///    divergence is logged and reported, first-seen fields are kept.
    /// 3. In both cases the `(id, selection)` association is recorded once.
    ///
    /// Calling this twice with the same inputs leaves the state unchanged the
    /// second time.
    pub fn ingest(&self, items: Vec<Item>, selection: &FilterSelection) -> IngestReport {
        let key = selection.key();
        let mut report = IngestReport {
            seen: items.len(),
            ..Default::default()
        };
        let mut state = self.lock();

        for item in items {
            let item = item.normalized();
            if item.id.trim().is_empty() {
                tracing::warn!("Skipping item without a stable id under {}", selection);
                report.skipped_without_id += 1;
                continue;
            }

            let item_id = item.id.clone();
            match state.item(&item_id) {
                None => {
                    tracing::trace!("Adding new item {} under {}", item_id, selection);
                    state.insert_item(item);
                    report.new_items += 1;
                }
                Some(existing) => {
                    let differing = existing.stable_differences(&item, &self.volatile);
                    if !differing.is_empty() {
                        tracing::warn!(
                            item = %item_id,
                            fields = ?differing,
                            "Stable fields differ from first sighting under {}; keeping first-seen values",
                            selection
                        );
                        report.mismatches.push(FieldMismatch {
                            item_id: item_id.clone(),
                            fields: differing,
                            selection: selection.to_string(),
                        });
                    }
                }
            }

            let inserted = state.insert_association(FilterAssociation {
                item_id,
                selection: key.clone(),
            });
            if inserted {
                report.new_associations += 1;
            }
        }

        report
    }

    /// Records that the subtree under `key` completed without abandonment
    pub fn mark_finished(&self, key: SelectionKey) -> bool {
        self.lock().mark_finished(key)
    }

    pub fn is_finished(&self, key: &SelectionKey) -> bool {
        self.lock().is_finished(key)
    }

    /// Runs `f` against the current state while holding the lock
    pub fn read<R>(&self, f: impl FnOnce(&CrawlState) -> R) -> R {
        f(&self.lock())
    }

    /// Clones the current state
    pub fn snapshot(&self) -> CrawlState {
        self.lock().clone()
    }

    pub fn into_state(self) -> CrawlState {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FacetValue, Locator};
    use serde_json::{json, Value};

    fn item(value: Value) -> Item {
        serde_json::from_value(value).unwrap()
    }

    fn selection(pairs: &[(&str, &str)]) -> FilterSelection {
        FilterSelection::new(
            pairs
                .iter()
                .map(|(facet, name)| FacetValue {
                    facet_title: facet.to_string(),
                    name: name.to_string(),
                    locator: Locator::Code {
                        code: name.to_string(),
                    },
                    enabled: true,
                })
                .collect(),
        )
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let collector = Collector::new(VolatileFields::default());
        let tops = selection(&[("Category", "tops")]);
        let batch = vec![
            item(json!({"id": "A", "name": "Tee", "position": 1})),
            item(json!({"id": "B", "name": "Tank", "position": 2})),
        ];

        let first = collector.ingest(batch.clone(), &tops);
        let after_first = collector.snapshot();
        let second = collector.ingest(batch, &tops);
        let after_second = collector.snapshot();

        assert_eq!(first.new_items, 2);
        assert_eq!(first.new_associations, 2);
        assert_eq!(second.new_items, 0);
        assert_eq!(second.new_associations, 0);
        assert_eq!(after_first.items(), after_second.items());
        assert_eq!(after_first.associations(), after_second.associations());
    }

    #[test]
    fn test_ingest_keeps_metadata_id_apart() {
        let collector = Collector::new(VolatileFields::default());
        let tops = selection(&[("Category", "tops")]);
        let mut tee = item(json!({"id": "A", "name": "Tee"}));
        tee.fields.insert("id".to_string(), json!(5));

        collector.ingest(vec![tee], &tops);

        let state = collector.snapshot();
        let stored = state.item("A").unwrap();
        assert!(!stored.fields.contains_key("id"));
        assert_eq!(stored.fields["source_id"], 5);
    }

    #[test]
    fn test_same_item_two_selections() {
        let collector = Collector::new(VolatileFields::default());
        let tops = selection(&[("Category", "tops")]);
        let tops_red = selection(&[("Category", "tops"), ("Color", "red")]);

        collector.ingest(
            vec![item(json!({"id": "A", "name": "Tee", "position": 1}))],
            &tops,
        );
        let report = collector.ingest(
            vec![item(json!({"id": "A", "name": "Tee", "position": 7}))],
            &tops_red,
        );

        let state = collector.into_state();
        assert!(report.mismatches.is_empty());
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.associations().len(), 2);
        assert_eq!(state.selections_for("A").len(), 2);
    }

    #[test]
    fn test_divergent_sighting_keeps_first() {
        let collector = Collector::new(VolatileFields::default());
        let tops = selection(&[("Category", "tops")]);
        let tops_blue = selection(&[("Category", "tops"), ("Color", "blue")]);

        collector.ingest(
            vec![item(json!({"id": "A", "name": "Tee", "price": 40}))],
            &tops,
        );
        let report = collector.ingest(
            vec![item(json!({"id": "A", "name": "Tee", "price": 35}))],
            &tops_blue,
        );

        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].fields, vec!["price".to_string()]);

        let state = collector.into_state();
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.item("A").unwrap().fields["price"], json!(40));
        assert_eq!(state.associations().len(), 2);
    }

    #[test]
    fn test_items_without_id_are_skipped() {
        let collector = Collector::new(VolatileFields::default());
        let report = collector.ingest(
            vec![item(json!({"id": "  ", "name": "Ghost"}))],
            &selection(&[("Category", "tops")]),
        );

        assert_eq!(report.skipped_without_id, 1);
        assert!(collector.snapshot().items().is_empty());
    }

    #[test]
    fn test_concurrent_ingest() {
        use std::sync::Arc;

        let collector = Arc::new(Collector::new(VolatileFields::default()));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    let name = format!("c{}", n);
                    let sel = selection(&[("Color", name.as_str())]);
                    collector.ingest(vec![item(json!({"id": "shared", "name": "Tee"}))], &sel)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = collector.snapshot();
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.associations().len(), 8);
    }

    #[test]
    fn test_mark_finished() {
        let collector = Collector::new(VolatileFields::default());
        let key = selection(&[("Category", "tops")]).key();

        assert!(!collector.is_finished(&key));
        assert!(collector.mark_finished(key.clone()));
        assert!(!collector.mark_finished(key.clone()));
        assert!(collector.is_finished(&key));
    }
}
