//! Factual source resolvers for catalog enrichment.
//!
//! Each resolver performs one best-effort lookup against a factual provider
//! and never fails towards its caller: transport errors, non-2xx responses and
//! malformed payloads all degrade to "not found" for the fields involved.
//!
//! - [`SummaryResolver`]: canonical reference URL from the summary-by-title endpoint
//! - [`CrossRefResolver`]: title to structured-facts entity id
//! - [`FactsResolver`]: typed facts from the entity claims document
//! - [`CatalogResolver`]: library-catalog suggestions and book facts

mod catalog;
mod client;
mod cross_ref;
mod facts;
mod summary;

use async_trait::async_trait;
use catalog_shared::{EntityType, FactBundle, FactSource, Result, SourcesConfig};

pub use catalog::{CatalogResolver, CatalogSuggestion, best_suggestion};
pub use client::build_client;
pub use cross_ref::CrossRefResolver;
pub use facts::{FactsResolver, parse_claim_year};
pub use summary::SummaryResolver;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Resolves a title to a single verified reference URL.
#[async_trait]
pub trait SummarySource: Send + Sync {
    /// `None` when nothing unambiguous exists for the title.
    async fn canonical_url(&self, title: &str) -> Option<String>;
}

/// Maps a free-text title to the structured-facts entity identifier.
#[async_trait]
pub trait CrossReferenceSource: Send + Sync {
    async fn cross_reference_id(&self, title: &str) -> Option<String>;
}

/// Extracts type-specific facts for an entity identifier.
#[async_trait]
pub trait StructuredFactsSource: Send + Sync {
    /// A `None` id short-circuits to the unfound bundle.
    async fn structured_facts(&self, id: Option<&str>, entity_type: EntityType) -> FactBundle;
}

/// Library catalog lookups for book-like entities.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Ranked suggestions for a free-text search term (empty on failure).
    async fn suggest(&self, term: &str) -> Vec<CatalogSuggestion>;

    /// Facts for the best suggestion matching `term`.
    async fn catalog_facts(&self, term: &str) -> FactBundle {
        let suggestions = self.suggest(term).await;
        match best_suggestion(&suggestions, term) {
            Some(s) => s.to_bundle(),
            None => FactBundle::not_found(FactSource::Catalog),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP-backed bundle
// ---------------------------------------------------------------------------

/// All HTTP resolvers, sharing one connection pool.
pub struct HttpSources {
    pub summary: SummaryResolver,
    pub cross_ref: CrossRefResolver,
    pub facts: FactsResolver,
    pub catalog: CatalogResolver,
}

impl HttpSources {
    /// Build every resolver from the `[sources]` config section.
    pub fn from_config(config: &SourcesConfig) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        Ok(Self {
            summary: SummaryResolver::new(client.clone(), &config.summary_base)?,
            cross_ref: CrossRefResolver::new(client.clone(), &config.cross_ref_base)?,
            facts: FactsResolver::new(client.clone(), &config.facts_base)?,
            catalog: CatalogResolver::new(client, &config.catalog_base)?,
        })
    }
}
