//! Deletion reconciliation: documents the current run did not touch are removed when the
//! filter now rejects them or the backend confirms they are gone.

use anyhow::Result;
use log::{debug, info, warn};

use crate::filter::PathFilter;
use crate::fs::FsProxy;
use crate::store::{DocumentQuery, DocumentStore};
use crate::url::Cid;

/// Returns the number of documents tombstoned.
pub fn reconcile(
    fs: &dyn FsProxy,
    store: &mut dyn DocumentStore,
    filter: &PathFilter,
    generation: i64,
) -> Result<u32> {
    let query = DocumentQuery {
        protocol: fs.protocol(),
        generation_before: generation,
    };
    let candidates = store.query(&query)?;
    info!(
        "Will inspect {} document(s) for suppression",
        candidates.len()
    );

    let to_delete: Vec<String> = candidates
        .into_iter()
        .filter(|cid| to_be_deleted(fs, filter, cid))
        .collect();
    info!("{} document(s) must be deleted", to_delete.len());
    if to_delete.is_empty() {
        return Ok(0);
    }
    let deleted = store.delete_batch(&to_delete)?;
    Ok(deleted as u32)
}

/// Excluded by the filter, or confirmed absent. Anything we cannot check is kept.
fn to_be_deleted(fs: &dyn FsProxy, filter: &PathFilter, cid: &str) -> bool {
    let location = match cid.parse::<Cid>().and_then(|c| fs.create_url_from_cid(&c)) {
        Ok(l) => l,
        Err(e) => {
            warn!("Keeping {}: {}", cid, e);
            return false;
        }
    };
    if !filter.accept(&location.local) {
        debug!("Delete from store (filtered): {}", cid);
        return true;
    }
    match fs.probe(&location).exists() {
        Some(true) => false,
        Some(false) => {
            debug!("Delete from store (not found): {}", cid);
            true
        }
        None => {
            warn!("Keeping {}: cannot check whether it still exists", cid);
            false
        }
    }
}
