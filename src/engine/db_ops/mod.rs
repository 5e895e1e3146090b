//! Database operations: schema, open, and the SQLite document store.

mod connection;
mod documents;

pub use connection::{open_db, open_db_in_memory};
pub use documents::SqliteStore;

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Upsert one emitted document.
pub(crate) const UPSERT_DOCUMENT_SQL: &str = r#"
INSERT OR REPLACE INTO documents
    (cid, protocol, status, generation, content, content_hash, content_ts, acl, acl_ts, sar, sar_ts)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

/// Tombstone: keep the row so consumers see the removal, drop every layer.
pub(crate) const TOMBSTONE_SQL: &str = r#"
UPDATE documents
SET status = 'DELETED', generation = ?2,
    content = NULL, content_hash = NULL, content_ts = NULL,
    acl = NULL, acl_ts = NULL, sar = NULL, sar_ts = NULL
WHERE cid = ?1 AND status != 'DELETED'
"#;

/// Schema for documents and runs tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    cid TEXT PRIMARY KEY,
    protocol TEXT NOT NULL,
    status TEXT NOT NULL,
    generation INTEGER NOT NULL,
    content BLOB,
    content_hash TEXT,
    content_ts INTEGER,
    acl TEXT,
    acl_ts INTEGER,
    sar TEXT,
    sar_ts INTEGER
);
CREATE INDEX IF NOT EXISTS idx_documents_scan ON documents(protocol, status, generation);

CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_s INTEGER NOT NULL
);
"#;
