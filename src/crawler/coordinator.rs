//! Crawler coordinator - run orchestration
//!
//! This module wires the pieces of a crawl together:
//! - Opening the checkpoint store and restoring a previous snapshot
//! - Building the driver factory from configuration
//! - Checking the configured facets against the live filter panel
//! - Running the scheduler and writing the resolved export

use crate::catalog::FacetCatalog;
use crate::checkpoint::{open_store, CheckpointStore, Checkpointer};
use crate::collector::Collector;
use crate::config::{Config, DriverKind};
use crate::crawler::policy::RetryPolicy;
use crate::crawler::pool::ContextPool;
use crate::crawler::scheduler::{CrawlReport, Scheduler};
use crate::driver::{
    build_http_client, DriverFactory, HtmlDriverFactory, ScriptedCatalog, ScriptedDriverFactory,
};
use crate::state::TaskState;
use crate::{ConfigError, CrawlError, DriverError, DriverResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds the driver factory named by `[driver]`
pub fn build_driver_factory(config: &Config) -> Result<Arc<dyn DriverFactory>, CrawlError> {
    match config.driver.kind {
        DriverKind::Html => {
            let selectors = config.driver.selectors.clone().ok_or_else(|| {
                ConfigError::Validation(
                    "driver.selectors is required for the html driver".to_string(),
                )
            })?;
            let root_url = Url::parse(&config.catalog.root_url)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid root_url: {}", e)))?;
            let client = build_http_client(
                config.user_agent.as_ref(),
                Duration::from_millis(config.driver.request_timeout_ms),
            )
            .map_err(DriverError::from)?;
            Ok(Arc::new(HtmlDriverFactory::new(client, root_url, selectors)))
        }
        DriverKind::Fixture => {
            let path = config.driver.fixture_path.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "driver.fixture-path is required for the fixture driver".to_string(),
                )
            })?;
            let catalog = ScriptedCatalog::from_path(Path::new(path))?;
            tracing::info!(
                "Replaying {} listings and {} pages from {}",
                catalog.listings.len(),
                catalog.pages.len(),
                path
            );
            Ok(Arc::new(ScriptedDriverFactory::new(catalog)))
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    catalog: Arc<FacetCatalog>,
    factory: Arc<dyn DriverFactory>,
    collector: Arc<Collector>,
    checkpointer: Arc<Checkpointer>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Whether to discard any existing checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Configuration, driver or checkpoint setup failed
    pub fn new(config: Config, fresh: bool) -> Result<Self, CrawlError> {
        let factory = build_driver_factory(&config)?;
        let store = open_store(&config.checkpoint)?;
        Self::with_components(config, factory, store, fresh)
    }

    /// Creates a coordinator around an existing driver factory and store
    ///
    /// Unless `fresh` is set, the latest snapshot in `store` is restored. A
    /// snapshot written for a different facet catalog is rejected.
    pub fn with_components(
        config: Config,
        factory: Arc<dyn DriverFactory>,
        mut store: Box<dyn CheckpointStore>,
        fresh: bool,
    ) -> Result<Self, CrawlError> {
        let catalog = config.facet_catalog()?;
        let fingerprint = catalog.fingerprint();

        let state = if fresh {
            tracing::info!("Starting fresh crawl, clearing checkpoint");
            store.clear()?;
            None
        } else {
            match store.load()? {
                Some(snapshot) if snapshot.catalog_fingerprint != fingerprint => {
                    return Err(ConfigError::CatalogMismatch {
                        expected: fingerprint,
                        found: snapshot.catalog_fingerprint,
                    }
                    .into());
                }
                Some(snapshot) => {
                    tracing::info!(
                        "Resuming from checkpoint written {}: {} items, {} associations, {} finished subtrees",
                        snapshot.updated_at.to_rfc3339(),
                        snapshot.state.items().len(),
                        snapshot.state.associations().len(),
                        snapshot.state.finished().len()
                    );
                    Some(snapshot.state)
                }
                None => {
                    tracing::info!("No checkpoint found, starting new crawl");
                    None
                }
            }
        };

        let volatile = config.volatile_fields();
        let collector = match state {
            Some(state) => Collector::with_state(state, volatile),
            None => Collector::new(volatile),
        };

        Ok(Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            factory,
            collector: Arc::new(collector),
            checkpointer: Arc::new(Checkpointer::new(store, fingerprint)),
        })
    }

    /// Checks that every configured facet exists in the filter panel
    ///
    /// Reading the panel is retried like a task. If it stays unreachable the
    /// check is skipped with a warning and the tasks' own retries take over;
    /// only a missing facet is an error. Drivers that cannot list facet
    /// groups skip the check.
    pub async fn preflight(&self) -> Result<(), CrawlError> {
        let policy = RetryPolicy::from_config(&self.config.crawler);
        let mut attempt = 0;
        let titles = loop {
            attempt += 1;
            let error = match tokio::time::timeout(policy.timeout, self.read_facet_titles()).await
            {
                Ok(Ok(titles)) => break titles,
                Ok(Err(e)) => CrawlError::from(e),
                Err(_) => CrawlError::Timeout {
                    path: "preflight".to_string(),
                    millis: policy.timeout.as_millis() as u64,
                },
            };

            if policy.after_failure(attempt, &error) == TaskState::Retrying {
                tracing::warn!(
                    "Preflight attempt {}/{} failed: {}; retrying",
                    attempt,
                    policy.max_attempts(),
                    error
                );
                continue;
            }
            tracing::warn!(
                "Filter panel unreachable after {} attempts ({}), skipping facet check",
                attempt,
                error
            );
            return Ok(());
        };

        let Some(titles) = titles else {
            tracing::debug!("Driver cannot list facet groups, skipping preflight");
            return Ok(());
        };

        for title in self.catalog.titles() {
            if !titles.iter().any(|t| t == title) {
                return Err(ConfigError::UnknownFacet(title.to_string()).into());
            }
        }

        tracing::info!("Preflight passed: {} facets present", self.catalog.len());
        Ok(())
    }

    async fn read_facet_titles(&self) -> DriverResult<Option<Vec<String>>> {
        let mut driver = self.factory.open_context().await?;
        driver.navigate(&self.config.catalog.root_url).await?;
        driver.facet_titles().await
    }

    /// Runs the crawl
    ///
    /// Only configuration problems found during preflight are returned as
    /// errors. Task failures are
    /// logged and counted in the report.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        self.preflight().await?;

        let crawler = &self.config.crawler;
        let contexts = crawler.max_concurrent_contexts as usize;
        let pool = ContextPool::new(
            Arc::clone(&self.factory),
            contexts,
            self.config.catalog.root_url.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&self.catalog),
            pool,
            Arc::clone(&self.collector),
            Arc::clone(&self.checkpointer),
            RetryPolicy::from_config(crawler),
            crawler.extract_at,
            contexts,
        ));

        tracing::info!(
            "Crawling {} across {} contexts (facets: {})",
            self.config.catalog.root_url,
            contexts,
            self.catalog.titles().collect::<Vec<_>>().join(" > ")
        );
        let start_time = std::time::Instant::now();
        let report = scheduler.run().await;

        tracing::info!(
            "Crawl finished in {:?}: {} tasks succeeded, {} abandoned, {} skipped, {} retries; {} items, {} associations",
            start_time.elapsed(),
            report.tasks_succeeded,
            report.tasks_abandoned,
            report.tasks_skipped,
            report.retries,
            report.items,
            report.associations
        );
        if report.tasks_abandoned > 0 {
            tracing::warn!(
                "{} tasks were abandoned; run again to backfill their subtrees",
                report.tasks_abandoned
            );
        }

        if let Some(path) = &self.config.checkpoint.resolved_path {
            if let Err(e) = self.export_resolved(Path::new(path)) {
                tracing::error!("Failed to write resolved export: {}", e);
            }
        }

        Ok(report)
    }

    /// Writes the resolved export of the current state to `path`
    pub fn export_resolved(&self, path: &Path) -> Result<(), CrawlError> {
        self.checkpointer.export_resolved(&self.collector, path)?;
        Ok(())
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }
}

/// Runs a complete crawl for `config`
pub async fn run_crawl(config: Config, fresh: bool) -> Result<CrawlReport, CrawlError> {
    let coordinator = Coordinator::new(config, fresh)?;
    coordinator.run().await
}
