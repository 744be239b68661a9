//! Crawler module for exhaustive facet exploration
//!
//! This module contains the core crawling logic, including:
//! - Turning raw filter-panel options into facet values
//! - A bounded pool of execution contexts
//! - Retry and abandonment policy per task
//! - The worker pool that descends the facet tree
//! - Overall run coordination (resume, preflight, export)

mod coordinator;
mod explorer;
mod policy;
mod pool;
mod scheduler;

pub use coordinator::{build_driver_factory, run_crawl, Coordinator};
pub use explorer::{list_values, to_facet_values};
pub use policy::RetryPolicy;
pub use pool::{ContextPool, PooledContext};
pub use scheduler::{CrawlReport, Scheduler};

use crate::config::Config;
use crate::CrawlError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the checkpoint store and restore or clear it
/// 2. Build the configured driver
/// 3. Check the facets against the live filter panel
/// 4. Explore every facet combination and checkpoint after each task
/// 5. Write the resolved export if one is configured
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fresh` - Whether to discard any existing checkpoint
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran; abandoned tasks are counted in the report
/// * `Err(CrawlError)` - Configuration or startup failed
pub async fn crawl(config: Config, fresh: bool) -> Result<CrawlReport, CrawlError> {
    run_crawl(config, fresh).await
}
