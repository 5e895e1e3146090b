//! SQLite-backed [`DocumentStore`]. Sends are grouped into transactions of
//! `DB_INSERT_BATCH_SIZE` rows; `flush` commits the open one.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::tools::now_secs;
use crate::store::{Document, DocumentQuery, DocumentStore, Layer};
use crate::types::Status;
use crate::utils::config::DB_INSERT_BATCH_SIZE;

use super::{TOMBSTONE_SQL, UPSERT_DOCUMENT_SQL, open_db, open_db_in_memory};

pub struct SqliteStore {
    conn: Connection,
    generation: i64,
    pending: usize,
}

/// Raw columns of one `documents` row (everything but the key and protocol).
struct StoredRow {
    status: String,
    generation: i64,
    content: Option<Vec<u8>>,
    content_hash: Option<String>,
    content_ts: Option<i64>,
    acl: Option<String>,
    acl_ts: Option<i64>,
    sar: Option<String>,
    sar_ts: Option<i64>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            generation: 0,
            pending: 0,
        }
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Row count per status, for run summaries.
    pub fn count_by_status(&mut self) -> Result<BTreeMap<String, usize>> {
        self.commit()?;
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            Ok((status, n.max(0) as usize))
        })?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, n) = row?;
            counts.insert(status, n);
        }
        Ok(counts)
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .context("commit transaction")?;
            debug!("Committed {} document(s)", self.pending);
        }
        self.pending = 0;
        Ok(())
    }
}

impl StoredRow {
    fn into_document(self, cid: &str) -> Result<Document> {
        let status: Status = self
            .status
            .parse()
            .map_err(|e: String| anyhow!("{cid}: {e}"))?;
        let content = match (self.content, self.content_ts) {
            (Some(data), Some(ts)) => Some(Layer::new(data, ts)),
            _ => None,
        };
        let acl = match (self.acl, self.acl_ts) {
            (Some(json), Some(ts)) => Some(Layer::new(
                serde_json::from_str(&json).with_context(|| format!("{cid}: decode ACL layer"))?,
                ts,
            )),
            _ => None,
        };
        let sar = match (self.sar, self.sar_ts) {
            (Some(json), Some(ts)) => Some(Layer::new(
                serde_json::from_str(&json).with_context(|| format!("{cid}: decode SAR layer"))?,
                ts,
            )),
            _ => None,
        };
        Ok(Document {
            cid: cid.to_string(),
            status,
            generation: self.generation,
            content,
            content_hash: self.content_hash,
            acl,
            sar,
        })
    }
}

impl DocumentStore for SqliteStore {
    fn begin_run(&mut self) -> Result<i64> {
        self.commit()?;
        self.conn
            .execute("INSERT INTO runs (started_s) VALUES (?1)", [now_secs()])
            .context("record run")?;
        self.generation = self.conn.last_insert_rowid();
        debug!("Run generation {}", self.generation);
        Ok(self.generation)
    }

    fn get(&mut self, cid: &str) -> Result<Option<Document>> {
        let row = self
            .conn
            .query_row(
                "SELECT status, generation, content, content_hash, content_ts, acl, acl_ts, sar, sar_ts \
                 FROM documents WHERE cid = ?1",
                [cid],
                |r| {
                    Ok(StoredRow {
                        status: r.get(0)?,
                        generation: r.get(1)?,
                        content: r.get(2)?,
                        content_hash: r.get(3)?,
                        content_ts: r.get(4)?,
                        acl: r.get(5)?,
                        acl_ts: r.get(6)?,
                        sar: r.get(7)?,
                        sar_ts: r.get(8)?,
                    })
                },
            )
            .optional()
            .context("load document")?;
        row.map(|r| r.into_document(cid)).transpose()
    }

    fn send(&mut self, doc: &Document) -> Result<()> {
        let protocol = doc
            .protocol()
            .ok_or_else(|| anyhow!("{}: not a managed document identifier", doc.cid))?;
        let acl = doc
            .acl
            .as_ref()
            .map(|l| serde_json::to_string(&l.data))
            .transpose()
            .context("encode ACL layer")?;
        let sar = doc
            .sar
            .as_ref()
            .map(|l| serde_json::to_string(&l.data))
            .transpose()
            .context("encode SAR layer")?;

        if self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .context("begin transaction")?;
        }
        let mut stmt = self
            .conn
            .prepare_cached(UPSERT_DOCUMENT_SQL)
            .context("prepare upsert")?;
        stmt.execute(params![
            doc.cid,
            protocol.as_str(),
            doc.status.as_str(),
            self.generation,
            doc.content.as_ref().map(|l| l.data.as_slice()),
            doc.content_hash,
            doc.content.as_ref().map(|l| l.timestamp),
            acl,
            doc.acl.as_ref().map(|l| l.timestamp),
            sar,
            doc.sar.as_ref().map(|l| l.timestamp),
        ])
        .with_context(|| format!("store {}", doc.cid))?;
        drop(stmt);

        self.pending += 1;
        if self.pending >= DB_INSERT_BATCH_SIZE {
            self.commit()?;
        }
        Ok(())
    }

    fn query(&mut self, query: &DocumentQuery) -> Result<Vec<String>> {
        self.commit()?;
        let mut stmt = self.conn.prepare(
            "SELECT cid FROM documents \
             WHERE protocol = ?1 AND status != 'DELETED' AND generation < ?2 ORDER BY cid",
        )?;
        let rows = stmt.query_map(
            params![query.protocol.as_str(), query.generation_before],
            |row| row.get::<_, String>(0),
        )?;
        let mut cids = Vec::new();
        for row in rows {
            cids.push(row?);
        }
        Ok(cids)
    }

    fn delete_batch(&mut self, cids: &[String]) -> Result<usize> {
        self.commit()?;
        let generation = self.generation;
        let tx = self.conn.transaction().context("begin transaction")?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(TOMBSTONE_SQL).context("prepare tombstone")?;
            for cid in cids {
                deleted += stmt
                    .execute(params![cid, generation])
                    .with_context(|| format!("delete {cid}"))?;
            }
        }
        tx.commit().context("commit transaction")?;
        Ok(deleted)
    }

    fn flush(&mut self) -> Result<()> {
        self.commit()
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            warn!("Could not commit pending documents: {e:#}");
        }
    }
}
