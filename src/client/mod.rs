//! Upstream API client.
//!
//! This module provides the paginated fetcher together with the HTTP
//! transport it runs on and the response-envelope parsing it relies on.

pub mod fetcher;
pub mod response;
pub mod transport;

pub use fetcher::{FetchPolicy, Fetcher, ParamNames};
pub use transport::{HttpTransport, PageTransport};
