//! SQL migration definitions for the PactLens database.
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
        description: "Initial schema: documents, extractions, analyses",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Uploaded contracts
CREATE TABLE IF NOT EXISTS documents (
    id             TEXT PRIMARY KEY,
    owner          TEXT NOT NULL,
    filename       TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    detected_type  TEXT,
    selected_party TEXT,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner);

-- Extracted text, one row per document
CREATE TABLE IF NOT EXISTS extractions (
    document_id TEXT PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
    text        TEXT NOT NULL,
    pages       INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

-- Analysis records. At most one per document: a concurrent second
-- full analysis fails on this constraint instead of duplicating.
CREATE TABLE IF NOT EXISTS analyses (
    id                      TEXT PRIMARY KEY,
    document_id             TEXT NOT NULL UNIQUE REFERENCES documents(id) ON DELETE CASCADE,
    detected_type           TEXT,
    parties_json            TEXT NOT NULL,
    score                   INTEGER,
    favorable               INTEGER,
    clauses_json            TEXT NOT NULL,
    risks_json              TEXT NOT NULL,
    opportunities_json      TEXT NOT NULL,
    summary                 TEXT,
    recommendations         TEXT,
    negotiation_points_json TEXT NOT NULL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
