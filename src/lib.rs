//! Facet-Crawl: an exhaustive faceted-catalog crawler
//!
//! This crate walks every combination of a catalog's filter facets (category,
//! color, size, season, ...) through a stateful page-automation driver,
//! deduplicates the items it sees and records which filter paths each item
//! satisfies. Progress is checkpointed after every task so interrupted crawls
//! can be resumed.

pub mod catalog;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod crawler;
pub mod driver;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Facet-Crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Task for {path} timed out after {millis}ms")]
    Timeout { path: String, millis: u64 },

    #[error("Invalid task transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TaskState,
        to: state::TaskState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-specific errors
///
/// These are the only errors that abort a crawl run. They are raised before
/// any task executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Malformed facet catalog: {0}")]
    MalformedCatalog(String),

    #[error("Unknown facet '{0}': the filter panel does not expose it")]
    UnknownFacet(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Checkpoint was written for a different facet catalog (expected {expected}, found {found})")]
    CatalogMismatch { expected: String, found: String },
}

/// Errors raised by a page-automation driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Driver operation timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode page data: {0}")]
    Decode(String),

    #[error("Locator not supported by this driver: {0}")]
    UnsupportedLocator(String),

    #[error("Driver context is closed")]
    Closed,
}

impl DriverError {
    /// Returns true if retrying the same call may succeed
    ///
    /// Timing-sensitive lookups, timeouts and network failures are transient.
    /// Locators the driver cannot address and closed contexts are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::UnsupportedLocator(_) | Self::Closed)
    }
}

/// Result type alias for Facet-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

// Re-export commonly used types
pub use catalog::{FacetCatalog, FacetValue, FilterSelection, Locator, Task};
pub use collector::{Collector, CrawlState, FilterAssociation, Item, VolatileFields};
pub use config::Config;
pub use state::TaskState;
