//! camara-digest - paginated fetch-and-aggregate for public open-data APIs.
//!
//! The pipeline has two stages. [`client::Fetcher`] pulls every page of a
//! query with bounded retry; [`analysis`] groups the resulting records into
//! deterministic count and sum tables.

pub mod analysis;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod report;

pub use client::{FetchPolicy, Fetcher, HttpTransport, PageTransport};
pub use error::{AttemptError, Error, Result};
