//! fsload: crawl an NFS export or SMB share into a document store, keeping content,
//! ACL and search-access (SAR) layers fresh and reconciling deletions.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fs;
pub mod security;
pub mod store;
pub mod types;
pub mod url;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use config::{FsConfig, Settings};
pub use engine::{CrawlParams, CrawlReport, Crawler, SqliteStore, run_crawl};
pub use error::{FsError, FsResult, Probe};
pub use filter::PathFilter;
pub use fs::{FsProxy, open_proxy};
pub use store::{Document, DocumentQuery, DocumentStore, Layer};
pub use url::{Cid, Location, Resolver};

use log::debug;

/// Result alias used by public fsload API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point for embedding: crawl `roots` (the configured root when empty) with
/// `settings` into `store`. `connect: false` assumes the share is already attached.
pub fn crawl(
    settings: &Settings,
    store: &mut dyn DocumentStore,
    roots: &[String],
    connect: bool,
) -> Result<CrawlReport> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        settings
    );
    let mut fs = open_proxy(&settings.fs)?;
    let default_roots;
    let roots = if roots.is_empty() {
        default_roots = vec![settings.fs.resolver().root_cid().to_string()];
        &default_roots
    } else {
        roots
    };
    let params = CrawlParams {
        filter: &settings.filter,
        acls: security::AclCache::new(settings.fs.acl_builder()),
        opts: settings.crawl.clone(),
        roots,
        connect,
        cancel: None,
    };
    run_crawl(fs.as_mut(), store, params)
}
