//! Facet explorer
//!
//! Turns the options the driver reports for one facet group into uniform
//! `FacetValue`s. This is the only place the raw option shapes are looked at.

use crate::catalog::FacetValue;
use crate::driver::{PageDriver, RawFacetOption};
use crate::DriverResult;
use std::collections::HashSet;

/// Lists the selectable values of `facet_title` in the context's current state
///
/// Only enabled options with a non-blank label and an addressable locator are
/// returned. Labels are trimmed. If two options share a name only the first is
/// kept.
pub async fn list_values(
    driver: &dyn PageDriver,
    facet_title: &str,
) -> DriverResult<Vec<FacetValue>> {
    let options = driver.list_facet_values(facet_title).await?;
    tracing::trace!("{} options listed for {}", options.len(), facet_title);
    Ok(to_facet_values(facet_title, options))
}

/// Converts raw options into enabled, named, unique facet values
pub fn to_facet_values(facet_title: &str, options: Vec<RawFacetOption>) -> Vec<FacetValue> {
    let mut seen = HashSet::new();
    let mut values = Vec::with_capacity(options.len());

    for option in options {
        if !option.is_enabled() {
            continue;
        }
        let Some(name) = option.label().map(str::trim).filter(|n| !n.is_empty()) else {
            tracing::debug!("Skipping unnamed option in {}: {:?}", facet_title, option);
            continue;
        };
        let Some(locator) = option.locator() else {
            continue;
        };

        if !seen.insert(name.to_string()) {
            tracing::debug!("Duplicate option '{}' in {}, keeping the first", name, facet_title);
            continue;
        }

        values.push(FacetValue {
            facet_title: facet_title.to_string(),
            name: name.to_string(),
            locator,
            enabled: true,
        });
    }

    values
}
