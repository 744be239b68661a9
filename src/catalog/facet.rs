use crate::catalog::Task;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// One filterable dimension of a catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facet {
    /// Title as shown in the filter panel (e.g. "Color")
    pub title: String,

    /// Zero-based position in the exploration order
    pub order: usize,
}

/// The ordered list of facets a crawl descends through
///
/// Values of facet *k* only make sense once facets 1..k-1 are applied, so the
/// order here is the order filters are replayed in for every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCatalog {
    facets: Vec<Facet>,
}

impl FacetCatalog {
    /// Builds a catalog from facet titles in exploration order
    ///
    /// # Returns
    ///
    /// * `Ok(FacetCatalog)` - The titles form a valid catalog
    /// * `Err(ConfigError::MalformedCatalog)` - Empty catalog, blank title, or
    ///   duplicate title (compared case-insensitively)
    pub fn new<I, S>(titles: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut facets = Vec::new();

        for (order, title) in titles.into_iter().enumerate() {
            let title = title.as_ref().trim();
            if title.is_empty() {
                return Err(ConfigError::MalformedCatalog(format!(
                    "facet #{} has an empty title",
                    order + 1
                )));
            }
            if !seen.insert(title.to_lowercase()) {
                return Err(ConfigError::MalformedCatalog(format!(
                    "facet '{}' is declared more than once",
                    title
                )));
            }
            facets.push(Facet {
                title: title.to_string(),
                order,
            });
        }

        if facets.is_empty() {
            return Err(ConfigError::MalformedCatalog(
                "at least one facet is required".to_string(),
            ));
        }

        Ok(Self { facets })
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.facets.iter().map(|f| f.title.as_str())
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Looks up a facet by exact title
    pub fn get(&self, title: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.title == title)
    }

    /// Hex SHA-256 of the ordered titles
    ///
    /// Stored with every checkpoint so a resume against a different catalog
    /// is rejected instead of silently mixing facet trees.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for facet in &self.facets {
            hasher.update(facet.title.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// The bootstrap task: empty selection, every facet remaining
    pub fn root_task(&self) -> Task {
        Task::new(Default::default(), self.facets.clone())
    }
}

/// How a driver addresses one facet option
///
/// Different option shapes in the filter panel (anchors, counted checkboxes,
/// color swatches) resolve to different locator kinds. Only the driver that
/// produced a locator interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Refinement link; applying it means following the link
    Href { href: String },

    /// Option addressed by its position in the panel
    Position { group: usize, index: usize },

    /// Option addressed by a driver-specific code (e.g. a swatch id)
    Code { code: String },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Href { href } => write!(f, "href:{}", href),
            Self::Position { group, index } => write!(f, "pos:{}/{}", group, index),
            Self::Code { code } => write!(f, "code:{}", code),
        }
    }
}

/// One selectable option of a facet, as seen in the current filter state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetValue {
    pub facet_title: String,
    pub name: String,
    pub locator: Locator,
    pub enabled: bool,
}
