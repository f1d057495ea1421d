//! Application configuration for the catalog tool.
//!
//! User config lives at `~/.catalog/catalog.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: only the names of the environment
//! variables holding them are.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "catalog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".catalog";

// ---------------------------------------------------------------------------
// Config structs (matching catalog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation provider settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Factual source endpoints.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Enrichment pipeline settings.
    #[serde(default)]
    pub enrich: EnrichConfig,

    /// Record storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the Responses-style API.
    #[serde(default = "default_generator_base")]
    pub base_url: String,

    /// Model used for constrained generation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_generator_base(),
            model: default_model(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_generator_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_generator_timeout() -> u64 {
    60
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Encyclopedia REST base (summary-by-title endpoint).
    #[serde(default = "default_summary_base")]
    pub summary_base: String,

    /// Encyclopedia action API (page-property lookup).
    #[serde(default = "default_cross_ref_base")]
    pub cross_ref_base: String,

    /// Structured-facts entity document base.
    #[serde(default = "default_facts_base")]
    pub facts_base: String,

    /// Library catalog base.
    #[serde(default = "default_catalog_base")]
    pub catalog_base: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_sources_timeout")]
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            summary_base: default_summary_base(),
            cross_ref_base: default_cross_ref_base(),
            facts_base: default_facts_base(),
            catalog_base: default_catalog_base(),
            timeout_secs: default_sources_timeout(),
        }
    }
}

fn default_summary_base() -> String {
    "https://en.wikipedia.org/api/rest_v1".into()
}
fn default_cross_ref_base() -> String {
    "https://en.wikipedia.org/w/api.php".into()
}
fn default_facts_base() -> String {
    "https://www.wikidata.org/wiki/Special:EntityData".into()
}
fn default_catalog_base() -> String {
    "https://openlibrary.org".into()
}
fn default_sources_timeout() -> u64 {
    10
}

/// `[enrich]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Wall-clock bound on a whole enrichment call, in seconds.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
        }
    }
}

fn default_deadline() -> u64 {
    45
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the record database (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Name of the env var holding the admin shared secret.
    #[serde(default = "default_admin_secret_env")]
    pub admin_secret_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            admin_secret_env: default_admin_secret_env(),
        }
    }
}

fn default_db_path() -> String {
    "~/.catalog/records.db".into()
}
fn default_admin_secret_env() -> String {
    "CATALOG_ADMIN_SECRET".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.catalog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.catalog/catalog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Read the generator API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.generator.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(CatalogError::config(format!(
            "generator API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read the admin shared secret, if one is configured in the environment.
pub fn resolve_admin_secret(config: &AppConfig) -> Option<String> {
    std::env::var(&config.storage.admin_secret_env)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
