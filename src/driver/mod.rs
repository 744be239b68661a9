//! Page-automation driver interface
//!
//! The crawler never touches a page directly. Everything goes through
//! `PageDriver`, one instance per execution context:
//! - `navigate` / `reset_filters` / `open_filter_panel` establish a known state
//! - `apply_facet_value` narrows the listing by one option
//! - `list_facet_values` / `extract_items` read the current state
//!
//! Every call may fail transiently. Implementations are expected to wait for
//! the page to settle before returning.
//!
//! Two drivers ship with the crate:
//! - `HtmlDriver` for server-rendered catalogs whose refinements are links
//! - `ScriptedDriver` which replays a recorded catalog from a JSON fixture

mod html;
mod scripted;

pub use html::{build_http_client, HtmlDriver, HtmlDriverFactory};
pub use scripted::{
    Extraction, Operation, ScriptedCatalog, ScriptedDriver, ScriptedDriverFactory,
    ScriptedFailure, ScriptedListing, ScriptedPage,
};

use crate::catalog::Locator;
use crate::collector::Item;
use crate::DriverResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One option as it appears in the filter panel
///
/// Catalogs render facets differently: categories as links, sizes as
/// checkboxes with result counts, colors as swatches. Each shape carries
/// different addressing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawFacetOption {
    /// Anchor-based refinement
    Link {
        label: Option<String>,
        href: Option<String>,
        #[serde(default)]
        disabled: bool,
    },

    /// Checkbox-like option showing how many results it would leave
    Counted {
        label: Option<String>,
        count: u32,
        group: usize,
        index: usize,
    },

    /// Color swatch addressed by its code
    Swatch {
        label: Option<String>,
        code: String,
        #[serde(default)]
        disabled: bool,
    },
}

impl RawFacetOption {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Link { label, .. } | Self::Counted { label, .. } | Self::Swatch { label, .. } => {
                label.as_deref()
            }
        }
    }

    /// How this option would be addressed, if it can be addressed at all
    pub fn locator(&self) -> Option<Locator> {
        match self {
            Self::Link { href, .. } => href.as_ref().map(|href| Locator::Href { href: href.clone() }),
            Self::Counted { group, index, .. } => Some(Locator::Position {
                group: *group,
                index: *index,
            }),
            Self::Swatch { code, .. } => Some(Locator::Code { code: code.clone() }),
        }
    }

    /// Whether the panel offers this option in the current state
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Link { href, disabled, .. } => !disabled && href.is_some(),
            Self::Counted { count, .. } => *count > 0,
            Self::Swatch { disabled, .. } => !disabled,
        }
    }
}

/// One execution context (a browser tab, an HTTP session, a replay cursor)
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `url` and waits for it to settle
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Clears every applied filter
    async fn reset_filters(&mut self) -> DriverResult<()>;

    /// Makes the filter panel available for listing and applying
    async fn open_filter_panel(&mut self) -> DriverResult<()>;

    /// Options currently shown for `facet_title`; must not change state
    async fn list_facet_values(&self, facet_title: &str) -> DriverResult<Vec<RawFacetOption>>;

    /// Applies one option and waits for the listing to update
    async fn apply_facet_value(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Items shown under the current filters
    async fn extract_items(&self) -> DriverResult<Vec<Item>>;

    /// Titles of every facet group in the panel, if the driver can tell
    async fn facet_titles(&self) -> DriverResult<Option<Vec<String>>> {
        Ok(None)
    }

    /// The catalog's own result count for the current filters, if shown
    async fn reported_count(&self) -> DriverResult<Option<usize>> {
        Ok(None)
    }
}

/// Opens new execution contexts for the context pool
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open_context(&self) -> DriverResult<Box<dyn PageDriver>>;
}
