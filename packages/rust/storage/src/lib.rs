//! libSQL storage for finished catalog records.
//!
//! The [`RecordStore`] keeps enriched records append-only, with list, lookup,
//! full-text search over title and tags, and a shared-secret gated delete.
//!
//! **Access rules:**
//! - `catalog enrich --save` and `catalog records delete`: read-write via [`RecordStore::open`]
//! - listing and search: read-only via [`RecordStore::open_readonly`]

mod migrations;

use std::path::Path;

use catalog_shared::{CatalogError, EnrichedRecord, Result, StoredRecord};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage handle wrapping a libSQL database.
pub struct RecordStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    admin_secret: Option<String>,
}

impl RecordStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let store = Self {
            db,
            conn,
            readonly: false,
            admin_secret: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::Storage(format!(
                "no record database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            admin_secret: None,
        })
    }

    /// Require `secret` for deletes. `None` leaves deletes ungated.
    pub fn with_admin_secret(mut self, secret: Option<String>) -> Self {
        self.admin_secret = secret;
        self
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CatalogError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CatalogError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Append a record and return its new id.
    pub async fn create(&self, record: &EnrichedRecord) -> Result<String> {
        self.check_writable()?;

        let violations = record.violations();
        if !violations.is_empty() {
            return Err(CatalogError::validation(format!(
                "refusing to store invalid record: {}",
                violations.join("; ")
            )));
        }

        let id = Uuid::now_v7().to_string();
        let body = serde_json::to_string(record)
            .map_err(|e| CatalogError::Storage(format!("failed to encode record: {e}")))?;
        let now = Utc::now().to_rfc3339();
        let tags = record.tags.join(" ");

        self.conn
            .execute(
                "INSERT INTO records (id, entity_type, title, tags, body_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    record.entity_type.as_str(),
                    record.title.as_str(),
                    tags.as_str(),
                    body.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        debug!(%id, title = %record.title, "record stored");
        Ok(id)
    }

    /// Look up one record by id.
    pub async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, body_json, created_at FROM records WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CatalogError::Storage(e.to_string())),
        }
    }

    /// Most recent records first.
    pub async fn list(&self, limit: u32) -> Result<Vec<StoredRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, body_json, created_at FROM records
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_stored(&row)?);
        }
        Ok(results)
    }

    /// Full-text search over titles and tags, best match first.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<StoredRecord>> {
        let Some(expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut rows = self
            .conn
            .query(
                "SELECT r.id, r.body_json, r.created_at
                 FROM records_fts fts
                 JOIN records r ON r.rowid = fts.rowid
                 WHERE records_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![expr, limit],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_stored(&row)?);
        }
        Ok(results)
    }

    /// Delete a record. Returns `false` when no record had that id.
    ///
    /// With an admin secret configured, `secret` must match it.
    pub async fn delete(&self, id: &str, secret: Option<&str>) -> Result<bool> {
        self.check_writable()?;

        if let Some(expected) = &self.admin_secret {
            if secret != Some(expected.as_str()) {
                warn!(%id, "delete rejected: admin secret mismatch");
                return Err(CatalogError::Unauthorized(
                    "admin secret missing or incorrect".into(),
                ));
            }
        }

        let affected = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1", params![id])
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        debug!(%id, affected, "record delete");
        Ok(affected > 0)
    }
}

/// Turn free text into a safe FTS5 expression: every word quoted, all required.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// Convert a `(id, body_json, created_at)` row to a [`StoredRecord`].
fn row_to_stored(row: &libsql::Row) -> Result<StoredRecord> {
    let id: String = row
        .get(0)
        .map_err(|e| CatalogError::Storage(e.to_string()))?;
    let body: String = row
        .get(1)
        .map_err(|e| CatalogError::Storage(e.to_string()))?;
    let created_at: String = row
        .get(2)
        .map_err(|e| CatalogError::Storage(e.to_string()))?;

    let record: EnrichedRecord = serde_json::from_str(&body)
        .map_err(|e| CatalogError::Storage(format!("corrupt record {id}: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::Storage(format!("invalid date: {e}")))?;

    Ok(StoredRecord {
        id,
        created_at,
        record,
    })
}
