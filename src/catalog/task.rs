use crate::catalog::{Facet, FacetCatalog, FacetValue, Locator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The facet/value pair recorded for an association
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SelectedValue {
    pub facet_title: String,
    pub value_name: String,
}

/// Driver-independent identity of a selection
///
/// Two selections with the same facet/value names are the same path even if
/// the locators differ between runs.
pub type SelectionKey = Vec<SelectedValue>;

/// Ordered chain of facet values forming one path through the facet tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSelection {
    values: Vec<FacetValue>,
}

impl FilterSelection {
    pub fn new(values: Vec<FacetValue>) -> Self {
        Self { values }
    }

    /// Returns a new selection with `value` appended
    pub fn with(&self, value: FacetValue) -> Self {
        let mut values = self.values.clone();
        values.push(value);
        Self { values }
    }

    pub fn values(&self) -> &[FacetValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn facet_titles(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.facet_title.as_str())
    }

    /// Locators in the order they must be applied
    pub fn locators(&self) -> impl Iterator<Item = &Locator> {
        self.values.iter().map(|v| &v.locator)
    }

    pub fn key(&self) -> SelectionKey {
        self.values
            .iter()
            .map(|v| SelectedValue {
                facet_title: v.facet_title.clone(),
                value_name: v.name.clone(),
            })
            .collect()
    }

    /// Every ancestor key including this selection's own, shortest first
    ///
    /// The empty (bootstrap) prefix is included.
    pub fn prefix_keys(&self) -> Vec<SelectionKey> {
        let key = self.key();
        (0..=key.len()).map(|n| key[..n].to_vec()).collect()
    }
}

impl fmt::Display for FilterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return write!(f, "(unfiltered)");
        }
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|v| format!("({}: {})", v.facet_title, v.name))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// A unit of crawl work
///
/// Invariant: `remaining` is exactly the suffix of the catalog that follows
/// the facets in `selection`, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    selection: FilterSelection,
    remaining: Vec<Facet>,
}

impl Task {
    pub(crate) fn new(selection: FilterSelection, remaining: Vec<Facet>) -> Self {
        Self {
            selection,
            remaining,
        }
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn remaining_facets(&self) -> &[Facet] {
        &self.remaining
    }

    /// The facet whose values become this task's children
    pub fn next_facet(&self) -> Option<&Facet> {
        self.remaining.first()
    }

    /// The bootstrap task has no selection; it only seeds root tasks
    pub fn is_bootstrap(&self) -> bool {
        self.selection.is_empty()
    }

    /// A leaf task has no facets left to explore
    pub fn is_leaf(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Depth in the facet tree (0 for the bootstrap task)
    pub fn depth(&self) -> usize {
        self.selection.len()
    }

    /// Creates the child task that additionally selects `value`
    ///
    /// Returns `None` if `value` does not belong to the next facet or this is
    /// a leaf.
    pub fn child(&self, value: FacetValue) -> Option<Task> {
        let next = self.next_facet()?;
        if next.title != value.facet_title {
            return None;
        }
        Some(Task {
            selection: self.selection.with(value),
            remaining: self.remaining[1..].to_vec(),
        })
    }

    /// Checks the selection-prefix / remaining-suffix invariant
    pub fn is_consistent_with(&self, catalog: &FacetCatalog) -> bool {
        let facets = catalog.facets();
        let depth = self.selection.len();
        if depth + self.remaining.len() != facets.len() {
            return false;
        }
        let prefix_ok = self
            .selection
            .facet_titles()
            .zip(facets.iter())
            .all(|(title, facet)| title == facet.title);
        prefix_ok && self.remaining.as_slice() == &facets[depth..]
    }
}
