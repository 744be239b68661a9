use crate::catalog::SelectionKey;
use crate::collector::{FilterAssociation, Item};
use std::collections::{BTreeSet, HashMap, HashSet};

/// The accumulated result of a crawl
///
/// Additive only: items, associations and finished subtrees are created and
/// never removed during a run. Insertion order is kept so snapshots are
/// stable between writes.
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    items: Vec<Item>,
    associations: Vec<FilterAssociation>,
    finished: BTreeSet<SelectionKey>,
    item_index: HashMap<String, usize>,
    seen_associations: HashSet<FilterAssociation>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from persisted parts
    ///
    /// Duplicate items keep their first occurrence and duplicate associations
    /// are dropped, so a hand-edited or concatenated snapshot still loads.
    pub fn from_parts(
        items: Vec<Item>,
        associations: Vec<FilterAssociation>,
        finished: impl IntoIterator<Item = SelectionKey>,
    ) -> Self {
        let mut state = Self::new();
        for item in items {
            if !state.item_index.contains_key(&item.id) {
                state.insert_item(item);
            }
        }
        for association in associations {
            state.insert_association(association);
        }
        state.finished.extend(finished);
        state
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn associations(&self) -> &[FilterAssociation] {
        &self.associations
    }

    pub fn finished(&self) -> &BTreeSet<SelectionKey> {
        &self.finished
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.item_index.get(id).map(|&idx| &self.items[idx])
    }

    pub fn item_ids(&self) -> BTreeSet<String> {
        self.item_index.keys().cloned().collect()
    }

    /// Associations as an order-independent set
    pub fn association_set(&self) -> BTreeSet<FilterAssociation> {
        self.associations.iter().cloned().collect()
    }

    /// Every selection an item was seen under
    pub fn selections_for(&self, item_id: &str) -> Vec<&SelectionKey> {
        self.associations
            .iter()
            .filter(|a| a.item_id == item_id)
            .map(|a| &a.selection)
            .collect()
    }

    pub fn is_finished(&self, key: &SelectionKey) -> bool {
        self.finished.contains(key)
    }

    pub(crate) fn insert_item(&mut self, item: Item) {
        self.item_index.insert(item.id.clone(), self.items.len());
        self.items.push(item);
    }

    /// Records an association; returns false if the pair was already known
    pub(crate) fn insert_association(&mut self, association: FilterAssociation) -> bool {
        if self.seen_associations.insert(association.clone()) {
            self.associations.push(association);
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_finished(&mut self, key: SelectionKey) -> bool {
        self.finished.insert(key)
    }
}
