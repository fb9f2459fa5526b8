//! Response envelope parsing.
//!
//! List endpoints answer with `{"dados": [...], "links": [{"rel": ..., "href": ...}]}`;
//! detail endpoints answer with `{"dados": {...}}`. `data` is accepted as an
//! alias for `dados`; when both are present `dados` wins. A null or missing
//! list is an empty page.

use crate::error::AttemptError;
use crate::models::{Continuation, Page, Record};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    dados: Option<Vec<Record>>,
    #[serde(default)]
    data: Option<Vec<Record>>,
    #[serde(default)]
    links: Option<Vec<Link>>,
}

#[derive(Debug, Deserialize)]
struct DetailEnvelope {
    #[serde(alias = "dados")]
    data: Record,
}

/// One pagination relation from the `links` list.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// Derive the continuation signal from an optional links list.
pub fn continuation(links: Option<&[Link]>) -> Continuation {
    match links {
        None => Continuation::Unknown,
        Some(links) if links.iter().any(|l| l.rel.eq_ignore_ascii_case("next")) => {
            Continuation::More
        }
        Some(_) => Continuation::Last,
    }
}

/// Parse the body of a list endpoint into page `number`.
pub fn parse_page(number: usize, body: &str) -> Result<Page, AttemptError> {
    let envelope: PageEnvelope =
        serde_json::from_str(body).map_err(|e| AttemptError::Decode(e.to_string()))?;

    Ok(Page {
        number,
        continuation: continuation(envelope.links.as_deref()),
        records: envelope.dados.or(envelope.data).unwrap_or_default(),
    })
}

/// Parse the body of a detail endpoint into its single record.
pub fn parse_detail(body: &str) -> Result<Record, AttemptError> {
    let envelope: DetailEnvelope =
        serde_json::from_str(body).map_err(|e| AttemptError::Decode(e.to_string()))?;
    Ok(envelope.data)
}
