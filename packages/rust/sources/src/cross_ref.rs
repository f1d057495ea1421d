//! Title to structured-facts identifier, via the page-property lookup API.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalog_shared::Result;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::CrossReferenceSource;
use crate::client::{fetch_json, parse_base};

/// Page property holding the structured-facts identifier.
const ID_PROPERTY: &str = "wikibase_item";

static ENTITY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Q[1-9][0-9]*$").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    #[serde(default)]
    missing: bool,
    pageprops: Option<PageProps>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    wikibase_item: Option<String>,
}

/// Resolver for the encyclopedia page-property API.
pub struct CrossRefResolver {
    client: Client,
    base: Url,
}

impl CrossRefResolver {
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
        let request = self.client.get(self.base.clone()).query(&[
            ("action", "query"),
            ("prop", "pageprops"),
            ("ppprop", ID_PROPERTY),
            ("redirects", "1"),
            ("format", "json"),
            ("formatversion", "2"),
            ("titles", title.trim()),
        ]);
        let response: QueryResponse = fetch_json(request).await?;
        Ok(id_from_response(response))
    }
}

#[async_trait]
impl CrossReferenceSource for CrossRefResolver {
    #[instrument(skip_all, fields(title = %title))]
    async fn cross_reference_id(&self, title: &str) -> Option<String> {
        match self.lookup(title).await {
            Ok(Some(id)) => {
                debug!(%id, "cross-reference resolved");
                Some(id)
            }
            Ok(None) => {
                debug!("no cross-reference for title");
                None
            }
            Err(e) => {
                debug!(error = %e, "cross-reference lookup unavailable");
                None
            }
        }
    }
}

fn id_from_response(response: QueryResponse) -> Option<String> {
    response
        .query?
        .pages
        .into_iter()
        .filter(|p| !p.missing)
        .find_map(|p| p.pageprops.and_then(|props| props.wikibase_item))
        .filter(|id| ENTITY_ID_RE.is_match(id))
}
