//! Statistics generation from a crawl snapshot
//!
//! This module provides functionality for summarizing and displaying what a
//! checkpoint holds.

use crate::checkpoint::Snapshot;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Fingerprint of the facet catalog the snapshot belongs to
    pub catalog_fingerprint: String,

    /// When the snapshot was written
    pub updated_at: DateTime<Utc>,

    /// Number of deduplicated items
    pub total_items: usize,

    /// Number of distinct (item, selection) pairs
    pub total_associations: usize,

    /// Number of subtrees that completed without abandonment
    pub finished_subtrees: usize,

    /// Distinct items seen per facet value, keyed by facet title then value
    pub items_by_facet_value: BTreeMap<String, BTreeMap<String, usize>>,

    /// Associations per selection depth
    pub associations_by_depth: BTreeMap<usize, usize>,

    /// Items that were never seen under any selection
    pub unassociated_items: usize,
}

/// Computes statistics for a snapshot
pub fn load_statistics(snapshot: &Snapshot) -> CrawlStatistics {
    let state = &snapshot.state;

    let mut per_value: BTreeMap<String, BTreeMap<String, BTreeSet<&str>>> = BTreeMap::new();
    let mut associations_by_depth = BTreeMap::new();
    let mut associated = BTreeSet::new();

    for association in state.associations() {
        associated.insert(association.item_id.as_str());
        *associations_by_depth
            .entry(association.selection.len())
            .or_insert(0) += 1;

        for value in &association.selection {
            per_value
                .entry(value.facet_title.clone())
                .or_default()
                .entry(value.value_name.clone())
                .or_default()
                .insert(association.item_id.as_str());
        }
    }

    let items_by_facet_value = per_value
        .into_iter()
        .map(|(facet, values)| {
            let counts = values
                .into_iter()
                .map(|(value, items)| (value, items.len()))
                .collect();
            (facet, counts)
        })
        .collect();

    let unassociated_items = state
        .items()
        .iter()
        .filter(|item| !associated.contains(item.id.as_str()))
        .count();

    CrawlStatistics {
        catalog_fingerprint: snapshot.catalog_fingerprint.clone(),
        updated_at: snapshot.updated_at,
        total_items: state.items().len(),
        total_associations: state.associations().len(),
        finished_subtrees: state.finished().len(),
        items_by_facet_value,
        associations_by_depth,
        unassociated_items,
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Snapshot written: {}", stats.updated_at.to_rfc3339());
    println!("  Catalog fingerprint: {}", stats.catalog_fingerprint);
    println!("  Items: {}", stats.total_items);
    println!("  Associations: {}", stats.total_associations);
    println!("  Finished subtrees: {}", stats.finished_subtrees);
    println!();

    if !stats.associations_by_depth.is_empty() {
        println!("Associations by Depth:");
        for (depth, count) in &stats.associations_by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    for (facet, values) in &stats.items_by_facet_value {
        println!("{} ({} values):", facet, values.len());
        // Sort values by item count (descending)
        let mut counts: Vec<_> = values.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (value, count) in counts {
            let percentage = if stats.total_items > 0 {
                (*count as f64 / stats.total_items as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", value, count, percentage);
        }
        println!();
    }

    if stats.unassociated_items > 0 {
        println!(
            "Warning: {} items have no recorded selection",
            stats.unassociated_items
        );
    }
}
