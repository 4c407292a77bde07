//! OMDb API client for movie metadata.
//!
//! Looks a movie up by title and, when known, release year. If OMDb has no
//! match for the title+year pair the request is repeated once without the
//! year. Network and decode failures are returned to the caller as-is.

use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::MetadataPayload;

pub const OMDB_API_BASE: &str = "http://www.omdbapi.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a lookup that reached OMDb and got an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(MetadataPayload),
    /// OMDb answered with `"Response": "False"` for every attempt
    NotFound,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("OMDb request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("OMDb response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Source of movie metadata keyed by title and year.
pub trait MetadataLookup {
    fn lookup(&self, title: &str, year: Option<i32>) -> Result<LookupOutcome, LookupError>;
}

pub struct OmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OmdbClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("movielens-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        })
    }

    /// One GET against the API. `Ok(None)` means OMDb said "not found".
    fn query(&self, title: &str, year: Option<i32>) -> Result<Option<MetadataPayload>, LookupError> {
        let mut params: Vec<(&str, String)> =
            vec![("apikey", self.api_key.clone()), ("t", title.to_string())];
        if let Some(year) = year {
            params.push(("y", year.to_string()));
        }

        // OMDb puts errors (bad key, unknown title) in the JSON body, sometimes
        // with a non-2xx status, so the status code is not checked.
        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .map_err(LookupError::Transport)?;
        let text = response.text().map_err(LookupError::Transport)?;
        let body: MetadataPayload = serde_json::from_str(&text).map_err(LookupError::Decode)?;

        if is_success(&body) {
            Ok(Some(body))
        } else {
            let reason = body.get("Error").and_then(|v| v.as_str()).unwrap_or("");
            debug!(title, ?year, reason, "OMDb returned no result");
            Ok(None)
        }
    }
}

impl MetadataLookup for OmdbClient {
    fn lookup(&self, title: &str, year: Option<i32>) -> Result<LookupOutcome, LookupError> {
        if let Some(payload) = self.query(title, year)? {
            debug!(title, ?year, "OMDb match");
            return Ok(LookupOutcome::Found(payload));
        }

        if year.is_some() {
            debug!(title, "OMDb had no match with year, retrying without year");
            if let Some(payload) = self.query(title, None)? {
                debug!(title, "OMDb match after dropping year");
                return Ok(LookupOutcome::Found(payload));
            }
        }

        Ok(LookupOutcome::NotFound)
    }
}

/// `"Response": "True"`; a JSON boolean is accepted as well.
fn is_success(body: &MetadataPayload) -> bool {
    match body.get("Response") {
        Some(Value::String(s)) => s == "True",
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}
