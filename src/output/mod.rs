//! Output module for crawl statistics and exports
//!
//! This module handles:
//! - Summarizing a snapshot for `--stats`
//! - Writing the resolved export (items joined with their selections)

mod resolved;
pub mod stats;

pub use resolved::{resolve, write_resolved};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
