//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use catalog_core::{EnrichProgress, Reconciler, Stage};
use catalog_shared::{
    AppConfig, CatalogError, EntityReference, EntityType, StoredRecord, expand_home, init_config,
    load_config, load_config_from, resolve_admin_secret, resolve_api_key,
};
use catalog_sources::{CatalogResolver, CatalogSource, build_client};
use catalog_storage::RecordStore;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Catalog: enrich entity references into complete catalog records.
#[derive(Parser)]
#[command(
    name = "catalog",
    version,
    about = "Enrich bare entity references into complete, validated catalog records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.catalog/catalog.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich one entity reference and print the record as JSON.
    Enrich {
        /// Entity title.
        #[arg(long)]
        title: String,

        /// Entity type: person, project, organization, topic, book, movie or concept.
        #[arg(long = "type")]
        entity_type: EntityType,

        /// Already-known field as key=value (repeatable). Values parse as JSON when they can.
        #[arg(long = "known", value_name = "KEY=VALUE")]
        known: Vec<String>,

        /// JSON file with an object of already-known fields.
        #[arg(long)]
        known_json: Option<PathBuf>,

        /// Also store the record and print its id.
        #[arg(long)]
        save: bool,
    },

    /// Search the library catalog for book suggestions.
    Suggest {
        /// Free-text search term.
        term: String,
    },

    /// Stored record management.
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Record subcommands.
#[derive(Subcommand)]
pub(crate) enum RecordsAction {
    /// List the most recent records.
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Print one record as JSON.
    Show { id: String },
    /// Full-text search over titles and tags.
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Delete a record (requires the admin secret when one is configured).
    Delete {
        id: String,
        /// Admin secret; defaults to the configured environment variable.
        #[arg(long)]
        secret: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "catalog=info",
        1 => "catalog=debug",
        _ => "catalog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Enrich {
            title,
            entity_type,
            known,
            known_json,
            save,
        } => {
            let config = resolve_config(config_path)?;
            let known = collect_known(&known, known_json.as_deref())?;
            cmd_enrich(&config, &title, entity_type, known, save).await
        }
        Command::Suggest { term } => cmd_suggest(&resolve_config(config_path)?, &term).await,
        Command::Records { action } => {
            let config = resolve_config(config_path)?;
            match action {
                RecordsAction::List { limit } => cmd_records_list(&config, limit).await,
                RecordsAction::Show { id } => cmd_records_show(&config, &id).await,
                RecordsAction::Search { query, limit } => {
                    cmd_records_search(&config, &query, limit).await
                }
                RecordsAction::Delete { id, secret } => {
                    cmd_records_delete(&config, &id, secret).await
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Merge `--known-json` and repeated `--known key=value` (the latter win).
fn collect_known(pairs: &[String], json_file: Option<&Path>) -> Result<Map<String, Value>> {
    let mut known = match json_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(eyre!("{} must contain a JSON object", path.display())),
            }
        }
        None => Map::new(),
    };

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| eyre!("invalid --known '{pair}': expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(eyre!("invalid --known '{pair}': empty key"));
        }
        let value = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        known.insert(key.to_string(), value);
    }
    Ok(known)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(
    config: &AppConfig,
    title: &str,
    entity_type: EntityType,
    known: Map<String, Value>,
    save: bool,
) -> Result<()> {
    let api_key = resolve_api_key(config)?;
    let reference = EntityReference::new(title, entity_type)?.with_known(known);
    let reconciler = Reconciler::from_config(config, api_key)?;

    info!(title, %entity_type, known = reference.known_fields.len(), "enriching entity");

    let progress = CliProgress::new();
    let record = match reconciler.enrich_with_progress(&reference, &progress).await {
        Ok(record) => record,
        Err(e) => {
            if let CatalogError::GenerationFailed { body, .. } = &e {
                if !body.is_empty() {
                    error!(%body, "upstream response body");
                }
            }
            return Err(e.into());
        }
    };
    drop(progress);

    println!("{}", serde_json::to_string_pretty(&record)?);

    if save {
        let store = open_store(config).await?;
        let id = store.create(&record).await?;
        eprintln!("Saved record {id}");
    }
    Ok(())
}

async fn cmd_suggest(config: &AppConfig, term: &str) -> Result<()> {
    let client = build_client(config.sources.timeout_secs)?;
    let catalog = CatalogResolver::new(client, &config.sources.catalog_base)?;
    let suggestions = catalog.suggest(term).await;

    if suggestions.is_empty() {
        eprintln!("No catalog suggestions for '{term}'.");
        return Ok(());
    }
    for s in &suggestions {
        let year = s
            .first_publish_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "----".into());
        println!("{year}  {}  ({})  {}", s.title, s.authors.join(", "), s.key);
    }
    Ok(())
}

async fn cmd_records_list(config: &AppConfig, limit: u32) -> Result<()> {
    let store = open_store_readonly(config).await?;
    print_summaries(&store.list(limit).await?);
    Ok(())
}

async fn cmd_records_show(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store_readonly(config).await?;
    let stored = store
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no record with id '{id}'"))?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

async fn cmd_records_search(config: &AppConfig, query: &str, limit: u32) -> Result<()> {
    let store = open_store_readonly(config).await?;
    print_summaries(&store.search(query, limit).await?);
    Ok(())
}

async fn cmd_records_delete(config: &AppConfig, id: &str, secret: Option<String>) -> Result<()> {
    let store = open_store(config).await?;
    let secret = secret.or_else(|| resolve_admin_secret(config));
    if store.delete(id, secret.as_deref()).await? {
        println!("Deleted record {id}");
        Ok(())
    } else {
        Err(eyre!("no record with id '{id}'"))
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn open_store(config: &AppConfig) -> Result<RecordStore> {
    let path = expand_home(&config.storage.db_path);
    Ok(RecordStore::open(&path)
        .await?
        .with_admin_secret(resolve_admin_secret(config)))
}

async fn open_store_readonly(config: &AppConfig) -> Result<RecordStore> {
    let path = expand_home(&config.storage.db_path);
    Ok(RecordStore::open_readonly(&path).await?)
}

fn print_summaries(records: &[StoredRecord]) {
    if records.is_empty() {
        eprintln!("No records.");
        return;
    }
    for stored in records {
        println!(
            "{}  {}  {:<12}  {}  [{}]",
            stored.id,
            stored.created_at.format("%Y-%m-%d"),
            stored.record.entity_type.as_str(),
            stored.record.title,
            stored.record.tags.join(", ")
        );
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner that follows the enrichment stages on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl EnrichProgress for CliProgress {
    fn stage(&self, stage: Stage) {
        match stage {
            Stage::Dispatched => self.spinner.set_message("Dispatching lookups"),
            Stage::AwaitingAll => self.spinner.set_message("Waiting for sources and generator"),
            Stage::Merged => self.spinner.set_message("Merging fields"),
            Stage::Normalized => self.spinner.set_message("Repairing record"),
            Stage::Done => self.spinner.finish_and_clear(),
        }
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
