//! Replays a recorded catalog
//!
//! A `ScriptedCatalog` describes what the filter panel shows and which items
//! are listed for each applied path (the option names applied since the last
//! reset). Failures can be injected per path and operation, optionally with a
//! delay so attempts run into the task timeout.
//!
//! Every context opened by one `ScriptedDriverFactory` shares a log of what
//! was extracted under which locators, which is what the integration tests
//! inspect.

use crate::catalog::Locator;
use crate::collector::Item;
use crate::driver::{DriverFactory, PageDriver, RawFacetOption};
use crate::{ConfigError, DriverError, DriverResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Options shown for `facet` once `path` is applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedListing {
    #[serde(default)]
    pub path: Vec<String>,
    pub facet: String,
    pub options: Vec<RawFacetOption>,
}

/// Items listed once `path` is applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedPage {
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub reported_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Navigate,
    Reset,
    OpenPanel,
    List,
    Apply,
    Extract,
}

/// Makes `operation` fail at `path`
///
/// For `Apply` the path includes the option being applied. `times` limits how
/// often the failure fires across all contexts; without it the operation
/// always fails. With `delay_ms` the call stalls that long before failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedFailure {
    #[serde(default)]
    pub path: Vec<String>,
    pub operation: Operation,
    #[serde(default)]
    pub times: Option<u32>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// A recorded catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedCatalog {
    /// Every facet group in the panel, for preflight
    #[serde(default)]
    pub facets: Vec<String>,
    #[serde(default)]
    pub listings: Vec<ScriptedListing>,
    #[serde(default)]
    pub pages: Vec<ScriptedPage>,
    #[serde(default)]
    pub failures: Vec<ScriptedFailure>,
}

fn owned_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

impl ScriptedCatalog {
    pub fn new<I, S>(facets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            facets: facets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Loads a catalog recorded as JSON
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ConfigError::Validation(format!("invalid fixture {}: {}", path.display(), e))
        })
    }

    pub fn with_listing(mut self, path: &[&str], facet: &str, options: Vec<RawFacetOption>) -> Self {
        self.listings.push(ScriptedListing {
            path: owned_path(path),
            facet: facet.to_string(),
            options,
        });
        self
    }

    pub fn with_page(mut self, path: &[&str], items: Vec<Item>) -> Self {
        self.pages.push(ScriptedPage {
            path: owned_path(path),
            items,
            reported_count: None,
        });
        self
    }

    pub fn with_reported_count(mut self, path: &[&str], count: usize) -> Self {
        let path = owned_path(path);
        match self.pages.iter_mut().find(|p| p.path == path) {
            Some(page) => page.reported_count = Some(count),
            None => self.pages.push(ScriptedPage {
                path,
                items: Vec::new(),
                reported_count: Some(count),
            }),
        }
        self
    }

    pub fn with_failure(mut self, failure: ScriptedFailure) -> Self {
        self.failures.push(failure);
        self
    }

    fn listings_at<'a>(&'a self, path: &'a [String]) -> impl Iterator<Item = &'a ScriptedListing> {
        self.listings.iter().filter(move |l| l.path == path)
    }

    fn page_at(&self, path: &[String]) -> Option<&ScriptedPage> {
        self.pages.iter().find(|p| p.path == path)
    }
}

/// One extraction as observed by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Locators applied since the last reset, in order
    pub applied: Vec<Locator>,
    /// Option names applied since the last reset
    pub path: Vec<String>,
}

#[derive(Debug, Default)]
struct ScriptLog {
    fired: Vec<u32>,
    extractions: Vec<Extraction>,
    resets: usize,
    contexts_opened: usize,
}

type SharedLog = Arc<Mutex<ScriptLog>>;

fn lock(log: &SharedLog) -> MutexGuard<'_, ScriptLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One replay cursor over a `ScriptedCatalog`
pub struct ScriptedDriver {
    catalog: Arc<ScriptedCatalog>,
    log: SharedLog,
    loaded: bool,
    panel_open: bool,
    path: Vec<String>,
    applied: Vec<Locator>,
}

impl ScriptedDriver {
    fn new(catalog: Arc<ScriptedCatalog>, log: SharedLog) -> Self {
        Self {
            catalog,
            log,
            loaded: false,
            panel_open: false,
            path: Vec::new(),
            applied: Vec::new(),
        }
    }

    /// Fires the first matching injected failure that still has budget
    async fn check_failure(&self, operation: Operation, path: &[String]) -> DriverResult<()> {
        let delay = {
            let mut log = lock(&self.log);
            if log.fired.len() < self.catalog.failures.len() {
                log.fired.resize(self.catalog.failures.len(), 0);
            }

            let hit = self.catalog.failures.iter().enumerate().find(|(idx, f)| {
                f.operation == operation
                    && f.path == path
                    && f.times.map_or(true, |times| log.fired[*idx] < times)
            });
            match hit {
                None => return Ok(()),
                Some((idx, failure)) => {
                    log.fired[idx] += 1;
                    failure.delay_ms
                }
            }
        };

        tracing::trace!("Injected {:?} failure at {:?}", operation, path);
        match delay {
            Some(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Err(DriverError::Timeout(format!("{:?} at {:?}", operation, path)))
            }
            None => Err(DriverError::ElementNotFound(format!(
                "{:?} at {:?}",
                operation, path
            ))),
        }
    }

    fn require_panel(&self) -> DriverResult<()> {
        if self.panel_open {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound("filter panel is closed".to_string()))
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&mut self, _url: &str) -> DriverResult<()> {
        self.check_failure(Operation::Navigate, &[]).await?;
        self.loaded = true;
        self.panel_open = false;
        self.path.clear();
        self.applied.clear();
        Ok(())
    }

    async fn reset_filters(&mut self) -> DriverResult<()> {
        self.check_failure(Operation::Reset, &self.path).await?;
        self.path.clear();
        self.applied.clear();
        lock(&self.log).resets += 1;
        Ok(())
    }

    async fn open_filter_panel(&mut self) -> DriverResult<()> {
        if !self.loaded {
            return Err(DriverError::ElementNotFound("no page loaded".to_string()));
        }
        self.check_failure(Operation::OpenPanel, &self.path).await?;
        self.panel_open = true;
        Ok(())
    }

    async fn list_facet_values(&self, facet_title: &str) -> DriverResult<Vec<RawFacetOption>> {
        self.require_panel()?;
        self.check_failure(Operation::List, &self.path).await?;
        Ok(self
            .catalog
            .listings_at(&self.path)
            .filter(|l| l.facet == facet_title)
            .flat_map(|l| l.options.iter().cloned())
            .collect())
    }

    async fn apply_facet_value(&mut self, locator: &Locator) -> DriverResult<()> {
        self.require_panel()?;
        let option = self
            .catalog
            .listings_at(&self.path)
            .flat_map(|l| l.options.iter())
            .find(|o| o.is_enabled() && o.locator().as_ref() == Some(locator))
            .ok_or_else(|| {
                DriverError::ElementNotFound(format!("option {} at {:?}", locator, self.path))
            })?;
        let name = option
            .label()
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| locator.to_string());

        let mut target = self.path.clone();
        target.push(name);
        self.check_failure(Operation::Apply, &target).await?;

        self.path = target;
        self.applied.push(locator.clone());
        Ok(())
    }

    async fn extract_items(&self) -> DriverResult<Vec<Item>> {
        self.check_failure(Operation::Extract, &self.path).await?;
        lock(&self.log).extractions.push(Extraction {
            applied: self.applied.clone(),
            path: self.path.clone(),
        });
        Ok(self
            .catalog
            .page_at(&self.path)
            .map(|p| p.items.clone())
            .unwrap_or_default())
    }

    async fn facet_titles(&self) -> DriverResult<Option<Vec<String>>> {
        if self.catalog.facets.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.catalog.facets.clone()))
        }
    }

    async fn reported_count(&self) -> DriverResult<Option<usize>> {
        Ok(self.catalog.page_at(&self.path).and_then(|p| p.reported_count))
    }
}

/// Opens `ScriptedDriver` contexts over one shared catalog and log
#[derive(Clone)]
pub struct ScriptedDriverFactory {
    catalog: Arc<ScriptedCatalog>,
    log: SharedLog,
}

impl ScriptedDriverFactory {
    pub fn new(catalog: ScriptedCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            log: Arc::default(),
        }
    }

    /// Every extraction performed so far, in completion order
    pub fn extractions(&self) -> Vec<Extraction> {
        lock(&self.log).extractions.clone()
    }

    pub fn resets(&self) -> usize {
        lock(&self.log).resets
    }

    pub fn contexts_opened(&self) -> usize {
        lock(&self.log).contexts_opened
    }
}

#[async_trait]
impl DriverFactory for ScriptedDriverFactory {
    async fn open_context(&self) -> DriverResult<Box<dyn PageDriver>> {
        lock(&self.log).contexts_opened += 1;
        Ok(Box::new(ScriptedDriver::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.log),
        )))
    }
}
