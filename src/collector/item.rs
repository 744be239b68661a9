use crate::catalog::SelectionKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Where a metadata key named `id` ends up inside `fields`
pub const SOURCE_ID_FIELD: &str = "source_id";

/// One product as extracted from a listing page
///
/// `id` is the catalog's own stable identifier. Every other field lives in
/// `fields` and is serialized flat next to the id, so `fields` never holds an
/// `id` key of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    /// Creates an item; an `id` key in `fields` is moved to `source_id`
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
        .normalized()
    }

    /// Moves a field named `id` out of the way of the item's own id
    ///
    /// The value is kept under `source_id`, with further `source_` prefixes
    /// while that name is taken.
    pub fn normalized(mut self) -> Self {
        if let Some(value) = self.fields.remove("id") {
            let mut key = SOURCE_ID_FIELD.to_string();
            while self.fields.contains_key(&key) {
                key = format!("source_{}", key);
            }
            self.fields.insert(key, value);
        }
        self
    }

    /// Names of the stable fields whose values differ from `other`'s
    ///
    /// A field present on one side only counts as differing. Volatile fields
    /// are ignored on both sides.
    pub fn stable_differences(&self, other: &Item, volatile: &VolatileFields) -> Vec<String> {
        let names: BTreeSet<&String> = self.fields.keys().chain(other.fields.keys()).collect();
        names
            .into_iter()
            .filter(|name| !volatile.is_volatile(name))
            .filter(|name| self.fields.get(*name) != other.fields.get(*name))
            .cloned()
            .collect()
    }
}

/// Link between an item and one filter path it was seen under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilterAssociation {
    pub item_id: String,
    pub selection: SelectionKey,
}

/// Decides which item fields may legitimately differ between sightings
///
/// The on-page position of an item changes with every filter combination, so
/// by default only `position` is volatile. Catalogs that expose other
/// context-dependent fields configure their own names or a custom predicate.
#[derive(Clone)]
pub enum VolatileFields {
    /// Fields with exactly these names are volatile
    Named(BTreeSet<String>),

    /// Fields for which the predicate returns true are volatile
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl VolatileFields {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Every field is stable
    pub fn none() -> Self {
        Self::Named(BTreeSet::new())
    }

    pub fn is_volatile(&self, field: &str) -> bool {
        match self {
            Self::Named(names) => names.contains(field),
            Self::Custom(predicate) => predicate(field),
        }
    }
}

impl Default for VolatileFields {
    fn default() -> Self {
        Self::named(["position"])
    }
}

impl fmt::Debug for VolatileFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(names) => f.debug_tuple("Named").field(names).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
