//! Library-catalog resolver: search suggestions and book facts.

use async_trait::async_trait;
use catalog_shared::{FactBundle, FactField, FactSource, RecordFacts, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::CatalogSource;
use crate::client::{fetch_json, join_segments, parse_base};

/// Number of suggestions requested per search.
const SUGGESTION_LIMIT: &str = "5";

/// Fields requested from the search endpoint.
const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,publisher,isbn,language";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    publisher: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    #[serde(default)]
    language: Vec<String>,
}

/// One catalog search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSuggestion {
    /// Catalog work key, e.g. `/works/OL59863W`.
    pub key: String,
    pub title: String,
    pub authors: Vec<String>,
    pub first_publish_year: Option<i32>,
    pub publishers: Vec<String>,
    pub isbns: Vec<String>,
    pub languages: Vec<String>,
}

impl From<SearchDoc> for CatalogSuggestion {
    fn from(doc: SearchDoc) -> Self {
        Self {
            key: doc.key,
            title: doc.title,
            authors: doc.author_name,
            first_publish_year: doc.first_publish_year,
            publishers: doc.publisher,
            isbns: doc.isbn,
            languages: doc.language,
        }
    }
}

impl CatalogSuggestion {
    /// 13-digit ISBN if the catalog lists one, else the first listed.
    pub fn preferred_isbn(&self) -> Option<&str> {
        self.isbns
            .iter()
            .find(|i| i.chars().filter(char::is_ascii_digit).count() == 13)
            .or_else(|| self.isbns.first())
            .map(String::as_str)
    }

    /// Facts carried by this catalog record.
    pub fn to_bundle(&self) -> FactBundle {
        let facts = RecordFacts {
            authors: FactField::queried(
                Some(self.authors.clone()).filter(|a| !a.is_empty()),
            ),
            published_year: FactField::queried(self.first_publish_year),
            publisher: FactField::queried(self.publishers.first().cloned()),
            isbn: FactField::queried(self.preferred_isbn().map(String::from)),
            language: FactField::queried(self.languages.first().cloned()),
            ..Default::default()
        };
        FactBundle::found(FactSource::Catalog, facts)
    }
}

/// Exact (case-insensitive) title match, else the top-ranked suggestion.
pub fn best_suggestion<'a>(
    suggestions: &'a [CatalogSuggestion],
    term: &str,
) -> Option<&'a CatalogSuggestion> {
    let wanted = term.trim().to_lowercase();
    suggestions
        .iter()
        .find(|s| s.title.trim().to_lowercase() == wanted)
        .or_else(|| suggestions.first())
}

/// Resolver for the library catalog search API.
pub struct CatalogResolver {
    client: Client,
    base: Url,
}

impl CatalogResolver {
    pub fn new(client: Client, base: &str) -> Result<Self> {
        Ok(Self {
            client,
            base: parse_base(base)?,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn search(&self, term: &str) -> Result<Vec<CatalogSuggestion>> {
        let url = join_segments(&self.base, &["search.json"]);
        let request = self.client.get(url).query(&[
            ("q", term.trim()),
            ("limit", SUGGESTION_LIMIT),
            ("fields", SEARCH_FIELDS),
        ]);
        let response: SearchResponse = fetch_json(request).await?;
        Ok(response.docs.into_iter().map(CatalogSuggestion::from).collect())
    }
}

#[async_trait]
impl CatalogSource for CatalogResolver {
    #[instrument(skip_all, fields(term = %term))]
    async fn suggest(&self, term: &str) -> Vec<CatalogSuggestion> {
        match self.search(term).await {
            Ok(suggestions) => {
                debug!(count = suggestions.len(), "catalog suggestions");
                suggestions
            }
            Err(e) => {
                debug!(error = %e, "catalog search unavailable");
                Vec::new()
            }
        }
    }
}
