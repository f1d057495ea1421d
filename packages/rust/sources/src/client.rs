//! Shared HTTP plumbing for the resolvers.

use std::time::Duration;

use catalog_shared::{CatalogError, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// Maximum number of redirects followed by resolver requests.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for resolver requests (several providers require one).
const USER_AGENT: &str = concat!("catalog-enricher/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with appropriate settings.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CatalogError::Network(format!("failed to build HTTP client: {e}")))
}

/// Parse a configured base URL.
pub(crate) fn parse_base(base: &str) -> Result<Url> {
    let url = Url::parse(base.trim_end_matches('/'))
        .map_err(|e| CatalogError::config(format!("invalid source URL '{base}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(CatalogError::config(format!(
            "source URL '{base}' cannot be used as a base"
        )));
    }
    Ok(url)
}

/// `base` with extra path segments appended (each segment percent-encoded).
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Send a request and decode a 2xx JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| CatalogError::Network(e.to_string()))?;

    let status = response.status();
    let url = response.url().clone();
    if !status.is_success() {
        return Err(CatalogError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| CatalogError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| CatalogError::parse(format!("{url}: {e}")))
}
