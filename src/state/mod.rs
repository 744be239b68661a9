//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TaskState`: Tracks the state of one task while a worker owns it
//!   (pending, running, retrying, succeeded, abandoned, skipped)

mod task_state;

pub use task_state::TaskState;
