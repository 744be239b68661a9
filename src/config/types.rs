use crate::catalog::FacetCatalog;
use crate::collector::VolatileFields;
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Facet-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    pub checkpoint: CheckpointConfig,
    pub driver: DriverConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: Option<UserAgentConfig>,
}

impl Config {
    /// Builds the validated facet catalog
    pub fn facet_catalog(&self) -> Result<FacetCatalog, ConfigError> {
        FacetCatalog::new(&self.catalog.facets)
    }

    pub fn volatile_fields(&self) -> VolatileFields {
        VolatileFields::named(self.dedup.volatile_fields.iter().cloned())
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of execution contexts that run root tasks in parallel
    #[serde(rename = "max-concurrent-contexts", default = "default_contexts")]
    pub max_concurrent_contexts: u32,

    /// Extra attempts a failing task gets before it is abandoned
    #[serde(rename = "max-retries", default = "default_retries")]
    pub max_retries: u32,

    /// Time budget for one task attempt (milliseconds)
    #[serde(rename = "task-timeout-ms", default = "default_task_timeout")]
    pub task_timeout_ms: u64,

    /// Which tasks extract items
    #[serde(rename = "extract-at", default)]
    pub extract_at: ExtractAt,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_contexts: default_contexts(),
            max_retries: default_retries(),
            task_timeout_ms: default_task_timeout(),
            extract_at: ExtractAt::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

fn default_contexts() -> u32 {
    8
}

fn default_retries() -> u32 {
    3
}

fn default_task_timeout() -> u64 {
    120_000
}

/// Tasks at which items are extracted and ingested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractAt {
    /// Every task with a non-empty selection
    #[default]
    EveryLevel,

    /// Only tasks with no facets left below them
    LeavesOnly,
}

/// The catalog being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Unfiltered listing page every context starts from
    #[serde(rename = "root-url")]
    pub root_url: String,

    /// Facet titles in exploration order
    pub facets: Vec<String>,
}

/// Deduplication settings
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Item fields that may differ between sightings of the same item
    #[serde(rename = "volatile-fields", default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            volatile_fields: default_volatile_fields(),
        }
    }
}

fn default_volatile_fields() -> Vec<String> {
    vec!["position".to_string()]
}

/// Where snapshots are written
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// Directory (json) or database file (sqlite)
    pub path: String,

    /// Where `--export-resolved` and the end of a run write the merged export
    #[serde(rename = "resolved-path")]
    pub resolved_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointBackend {
    #[default]
    Json,
    Sqlite,
}

/// Which driver runs the execution contexts
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    pub kind: DriverKind,

    /// Recorded catalog for the fixture driver
    #[serde(rename = "fixture-path")]
    pub fixture_path: Option<String>,

    /// Per-request timeout for the HTML driver (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// CSS selectors for the HTML driver
    pub selectors: Option<SelectorConfig>,
}

fn default_request_timeout() -> u64 {
    30_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    Html,
    Fixture,
}

/// CSS selectors describing a server-rendered filter panel and listing
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// One facet group in the filter panel
    #[serde(rename = "facet-group")]
    pub facet_group: String,

    /// Group title, relative to the group
    #[serde(rename = "facet-title")]
    pub facet_title: String,

    /// One option, relative to the group
    #[serde(rename = "facet-option")]
    pub facet_option: String,

    /// Option label, relative to the option
    #[serde(rename = "option-label")]
    pub option_label: String,

    /// Option link, relative to the option
    #[serde(rename = "option-link", default = "default_option_link")]
    pub option_link: String,

    /// Class marking an option the panel currently disables
    #[serde(rename = "disabled-class", default = "default_disabled_class")]
    pub disabled_class: String,

    /// One product tile in the listing
    pub item: String,

    /// Attribute on the tile holding the product's JSON metadata
    #[serde(rename = "item-data-attribute")]
    pub item_data_attribute: String,

    /// Metadata field holding the stable identifier
    #[serde(rename = "item-id-field")]
    pub item_id_field: String,

    /// Element showing the catalog's own result count
    #[serde(rename = "result-count")]
    pub result_count: Option<String>,
}

fn default_option_link() -> String {
    "a".to_string()
}

fn default_disabled_class() -> String {
    "disabled".to_string()
}

/// User agent identification for the HTML driver
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}
