//! Summary-by-title endpoint: the canonical reference URL for an entry.
//!
//! Precision over recall: a disambiguation page is treated as "not found"
//! because a wrong reference link is worse than none.

use async_trait::async_trait;
use catalog_shared::{Result, is_http_url};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::SummarySource;
use crate::client::{fetch_json, join_segments, parse_base};

/// Page type reported for disambiguation pages.
const DISAMBIGUATION: &str = "disambiguation";

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    #[serde(rename = "type", default)]
    page_type: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    page: Option<String>,
}

/// Resolver for the encyclopedia summary endpoint.
pub struct SummaryResolver {
    client: Client,
    base: Url,
}

impl SummaryResolver {
    pub fn new(client: Client, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_base(base)?,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn lookup(&self, title: &str) -> Result<Option<String>> {
        let url = join_segments(&self.base, &["page", "summary", &title_to_segment(title)]);
        let payload: SummaryPayload = fetch_json(self.client.get(url)).await?;
        Ok(canonical_from_payload(payload))
    }
}

#[async_trait]
impl SummarySource for SummaryResolver {
    #[instrument(skip_all, fields(title = %title))]
    async fn canonical_url(&self, title: &str) -> Option<String> {
        match self.lookup(title).await {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "summary endpoint unavailable");
                None
            }
        }
    }
}

/// Encyclopedia titles use underscores in place of spaces.
fn title_to_segment(title: &str) -> String {
    title.trim().replace(' ', "_")
}

fn canonical_from_payload(payload: SummaryPayload) -> Option<String> {
    if payload.page_type == DISAMBIGUATION {
        debug!("disambiguation page, refusing to link");
        return None;
    }
    payload
        .content_urls
        .and_then(|c| c.desktop)
        .and_then(|d| d.page)
        .filter(|page| is_http_url(page))
}
