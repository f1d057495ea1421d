//! Entity enrichment pipeline for the catalog.
//!
//! Turns a bare [`EntityReference`](catalog_shared::EntityReference) into a
//! complete [`EnrichedRecord`](catalog_shared::EnrichedRecord) by running the
//! factual resolvers and one constrained generation call concurrently, then
//! merging under fixed field ownership and repairing the result.

pub mod extract;
pub mod generator;
pub mod merge;
pub mod normalize;
pub mod reconcile;
pub mod schema;

pub use extract::{ShapeRegistry, extract_structured};
pub use generator::{Generator, HttpGenerator, RawResponse};
pub use merge::merge;
pub use normalize::{Draft, NormalizeReport, Shortfall, normalize, normalize_tags};
pub use reconcile::{EnrichProgress, Reconciler, SilentProgress, Stage};
pub use schema::GenerationRequest;
