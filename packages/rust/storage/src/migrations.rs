//! SQL migration definitions for the record database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: records, FTS5 over title and tags",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Finished catalog records (append-only)
CREATE TABLE IF NOT EXISTS records (
    id          TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    title       TEXT NOT NULL,
    tags        TEXT NOT NULL,
    body_json   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
CREATE INDEX IF NOT EXISTS idx_records_type ON records(entity_type);

CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    title,
    tags,
    content=records,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS records_fts_insert AFTER INSERT ON records BEGIN
    INSERT INTO records_fts(rowid, title, tags)
    VALUES (new.rowid, new.title, new.tags);
END;

CREATE TRIGGER IF NOT EXISTS records_fts_delete AFTER DELETE ON records BEGIN
    INSERT INTO records_fts(records_fts, rowid, title, tags)
    VALUES ('delete', old.rowid, old.title, old.tags);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
