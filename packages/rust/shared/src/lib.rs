//! Shared types, error model, and configuration for the catalog workspace.
//!
//! This crate is the foundation depended on by all other catalog crates.
//! It provides:
//! - [`CatalogError`], the unified error type
//! - Domain types ([`EntityReference`], [`FactBundle`], [`EnrichedRecord`], [`FactField`])
//! - Configuration ([`AppConfig`], config loading, secret resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EnrichConfig, GeneratorConfig, SourcesConfig, StorageConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
    resolve_admin_secret, resolve_api_key,
};
pub use error::{CatalogError, Result};
pub use types::{
    EnrichedRecord, EntityReference, EntityType, FactBundle, FactField, FactKey, FactSource,
    IMAGE_PATTERN, MAX_SUMMARY_CHARS, MAX_TAG_LEN, MAX_TAGS, MIN_SUMMARY_CHARS, MIN_TAGS,
    NO_REFERENCE_HREF, RecordFacts, SCHEMA_NAME, SCHEMA_VERSION, SUMMARY_SENTINEL, StoredRecord,
    TAG_PATTERN, is_http_url, is_valid_image_name, is_valid_tag, slugify,
};
