//! Paginated fetching with bounded retry.
//!
//! Pages are requested one at a time. A page is appended to the result only
//! after it was fetched and decoded successfully, so a failed fetch never
//! yields a partial result.

use crate::client::response::{parse_detail, parse_page};
use crate::client::transport::PageTransport;
use crate::error::{AttemptError, Error, Result};
use crate::models::{Continuation, FetchResult, Query, Record, StopReason};
use futures::{stream, StreamExt, TryStreamExt};
use indicatif::ProgressBar;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Names of the paging and sorting query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamNames {
    pub page: String,
    pub page_size: String,
    pub sort_field: String,
    pub sort_direction: String,
}

impl Default for ParamNames {
    fn default() -> Self {
        Self {
            page: "pagina".to_string(),
            page_size: "itens".to_string(),
            sort_field: "ordenarPor".to_string(),
            sort_direction: "ordem".to_string(),
        }
    }
}

/// Upstream location plus retry and politeness settings.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub base_url: String,
    /// Largest page size the upstream accepts; larger requests are capped.
    pub max_page_size: usize,
    /// Total attempts per page, first try included.
    pub max_attempts: usize,
    /// Fixed delay between attempts at the same page.
    pub retry_delay: Duration,
    /// Delay between successful page requests.
    pub page_delay: Duration,
    pub params: ParamNames,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            base_url: "https://dadosabertos.camara.leg.br/api/v2".to_string(),
            max_page_size: 100,
            max_attempts: 3,
            retry_delay: Duration::from_millis(1200),
            page_delay: Duration::from_millis(200),
            params: ParamNames::default(),
        }
    }
}

impl FetchPolicy {
    /// Absolute URL of a resource path.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Fetches every page of a query from a [`PageTransport`].
///
/// The fetcher keeps no per-query state, so one instance can serve several
/// queries at once (see [`Fetcher::fetch_many`]).
pub struct Fetcher<T> {
    transport: T,
    policy: FetchPolicy,
    progress: Option<ProgressBar>,
}

impl<T: PageTransport> Fetcher<T> {
    pub fn new(transport: T, policy: FetchPolicy) -> Self {
        Self {
            transport,
            policy,
            progress: None,
        }
    }

    /// Report page progress on a spinner.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetch all records of `query`, at most `max_pages` pages of `page_size`.
    pub async fn fetch_all(
        &self,
        query: &Query,
        page_size: usize,
        max_pages: usize,
    ) -> Result<FetchResult> {
        validate_paging(page_size, max_pages)?;
        let page_size = self.effective_page_size(page_size);
        let url = self.policy.url_for(&query.endpoint);

        info!(
            "Fetching {} (page size {}, at most {} pages)",
            query.endpoint, page_size, max_pages
        );

        let mut records: Vec<Record> = Vec::new();
        let mut pages = 0;
        let mut stop = StopReason::PageCeiling;

        for number in 1..=max_pages {
            if number > 1 && !self.policy.page_delay.is_zero() {
                tokio::time::sleep(self.policy.page_delay).await;
            }

            let params = self.page_params(query, number, page_size);
            let page = self
                .get_with_retry(&query.endpoint, &url, &params, number, |body| {
                    parse_page(number, body)
                })
                .await?;

            if page.records.is_empty() {
                debug!("{}: page {} is empty", query.endpoint, number);
                stop = StopReason::EmptyPage;
                break;
            }

            pages += 1;
            records.extend(page.records);

            if let Some(ref pb) = self.progress {
                pb.set_message(format!(
                    "{}: page {} ({} records)",
                    query.endpoint,
                    number,
                    records.len()
                ));
            }

            if page.continuation == Continuation::Last {
                stop = StopReason::NoNextPage;
                break;
            }
        }

        if stop == StopReason::PageCeiling {
            warn!(
                "{}: stopped at the {}-page ceiling; more records may exist",
                query.endpoint, max_pages
            );
        }

        info!(
            "{}: {} records from {} pages ({})",
            query.endpoint,
            records.len(),
            pages,
            stop
        );

        Ok(FetchResult {
            endpoint: query.endpoint.clone(),
            records,
            pages,
            stop,
        })
    }

    /// Fetch several independent queries with at most `concurrency` in flight.
    ///
    /// Results keep the order of `queries`. The first failure fails the batch.
    pub async fn fetch_many(
        &self,
        queries: &[Query],
        page_size: usize,
        max_pages: usize,
        concurrency: usize,
    ) -> Result<Vec<FetchResult>> {
        validate_paging(page_size, max_pages)?;
        if concurrency == 0 {
            return Err(Error::InvalidParameters(
                "concurrency must be at least 1".to_string(),
            ));
        }

        debug!(
            "Fetching {} queries, {} at a time",
            queries.len(),
            concurrency
        );

        stream::iter(queries)
            .map(|query| self.fetch_all(query, page_size, max_pages))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    /// Fetch a single-entity resource such as `deputados/{id}`.
    pub async fn fetch_one(&self, endpoint: &str) -> Result<Record> {
        let url = self.policy.url_for(endpoint);
        self.get_with_retry(endpoint, &url, &[], 1, parse_detail)
            .await
    }

    fn effective_page_size(&self, requested: usize) -> usize {
        if requested > self.policy.max_page_size {
            warn!(
                "Page size {} exceeds the upstream maximum; using {}",
                requested, self.policy.max_page_size
            );
            self.policy.max_page_size
        } else {
            requested
        }
    }

    fn page_params(&self, query: &Query, number: usize, page_size: usize) -> Vec<(String, String)> {
        let names = &self.policy.params;
        let mut params: Vec<(String, String)> = query
            .active_filters()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if let Some(ref sort) = query.sort {
            params.push((names.sort_field.clone(), sort.field.clone()));
            params.push((names.sort_direction.clone(), sort.direction.to_string()));
        }

        params.push((names.page.clone(), number.to_string()));
        params.push((names.page_size.clone(), page_size.to_string()));
        params
    }

    /// GET `url` until `parse` accepts the body or the attempt ceiling is hit.
    async fn get_with_retry<P, F>(
        &self,
        endpoint: &str,
        url: &str,
        params: &[(String, String)],
        page: usize,
        parse: F,
    ) -> Result<P>
    where
        F: Fn(&str) -> std::result::Result<P, AttemptError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match self.transport.get(url, params).await {
                Ok(body) => parse(&body),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(parsed) => return Ok(parsed),
                Err(cause) if attempt < max_attempts => {
                    warn!(
                        "{} page {}: attempt {}/{} failed: {}",
                        endpoint, page, attempt, max_attempts, cause
                    );
                    if !self.policy.retry_delay.is_zero() {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
                Err(cause) => {
                    return Err(Error::FetchFailed {
                        endpoint: endpoint.to_string(),
                        page,
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }
}

fn validate_paging(page_size: usize, max_pages: usize) -> Result<()> {
    if page_size == 0 {
        return Err(Error::InvalidParameters(
            "page size must be at least 1".to_string(),
        ));
    }
    if max_pages == 0 {
        return Err(Error::InvalidParameters(
            "max pages must be at least 1".to_string(),
        ));
    }
    Ok(())
}
