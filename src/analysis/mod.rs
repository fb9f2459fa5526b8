//! Analysis modules.
//!
//! Grouping and summing of fetched records.

pub mod aggregator;

pub use aggregator::{group_count, group_sum, total};
