//! Facet catalog and task model
//!
//! This module defines the facet tree the crawler walks:
//! - `FacetCatalog`: the ordered, validated list of facets fixed at crawl start
//! - `FacetValue` / `Locator`: one selectable option and how the driver addresses it
//! - `FilterSelection`: a path from the root of the facet tree
//! - `Task`: a selection plus the facets still to explore beneath it
//!
//! # Example
//!
//! ```
//! use facet_crawl::catalog::FacetCatalog;
//!
//! let catalog = FacetCatalog::new(["Category", "Color", "Size", "Season"]).unwrap();
//! let root = catalog.root_task();
//! assert_eq!(root.next_facet().unwrap().title, "Category");
//! ```

mod facet;
mod task;

pub use facet::{Facet, FacetCatalog, FacetValue, Locator};
pub use task::{FilterSelection, SelectedValue, SelectionKey, Task};
