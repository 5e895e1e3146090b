//! Documents emitted by the crawl and the store they are emitted to.

use anyhow::Result;

use crate::engine::hashing::content_digest;
use crate::security::{Acl, Sar};
use crate::types::{Protocol, Status};

/// One data layer and the source timestamp it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer<T> {
    pub data: T,
    /// Seconds since epoch: source mtime (content), source ctime (ACL), crawl time (SAR).
    pub timestamp: i64,
}

impl<T> Layer<T> {
    pub fn new(data: T, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// Strictly older than `last_change` at the source.
    pub fn is_obsolete(&self, last_change: i64) -> bool {
        last_change > self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub cid: String,
    pub status: Status,
    /// Run that last emitted this document.
    pub generation: i64,
    pub content: Option<Layer<Vec<u8>>>,
    /// blake3 hex digest of the content layer.
    pub content_hash: Option<String>,
    pub acl: Option<Layer<Acl>>,
    pub sar: Option<Layer<Sar>>,
}

impl Document {
    pub fn new(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            status: Status::Ko,
            generation: 0,
            content: None,
            content_hash: None,
            acl: None,
            sar: None,
        }
    }

    pub fn set_content(&mut self, data: Vec<u8>, timestamp: i64) {
        self.content_hash = Some(content_digest(&data));
        self.content = Some(Layer::new(data, timestamp));
    }

    /// Protocol from the CID scheme.
    pub fn protocol(&self) -> Option<Protocol> {
        self.cid.split_once("://")?.0.parse().ok()
    }
}

/// Candidate selection for deletion reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub protocol: Protocol,
    /// Only documents last emitted before this run.
    pub generation_before: i64,
}

/// Downstream document store, keyed by CID.
pub trait DocumentStore {
    /// Start a run; returns its generation, strictly greater than any previous one.
    fn begin_run(&mut self) -> Result<i64>;

    fn get(&mut self, cid: &str) -> Result<Option<Document>>;

    /// Emit a document. The store stamps it with the current generation.
    fn send(&mut self, doc: &Document) -> Result<()>;

    /// CIDs of non-deleted documents matching `query`.
    fn query(&mut self, query: &DocumentQuery) -> Result<Vec<String>>;

    /// Tombstone the given documents; returns how many changed.
    fn delete_batch(&mut self, cids: &[String]) -> Result<usize>;

    /// Make everything sent so far durable.
    fn flush(&mut self) -> Result<()>;
}
