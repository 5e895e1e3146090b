//! Crawl / diff engine: depth-first walk that refreshes stale layers and emits one
//! document per visited file and directory.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{FsError, FsResult};
use crate::filter::PathFilter;
use crate::fs::FsProxy;
use crate::security::{AclCache, MappingMisses, compute_sar};
use crate::store::{Document, DocumentStore, Layer};
use crate::types::{CrawlOpts, CrawlStats, Status};
use crate::url::{Cid, Location};

use super::progress::{EmitCounter, create_counter};
use super::reconcile::reconcile;
use super::tools::{now_secs, plural};

/// Why a walk step stopped early.
enum WalkError {
    /// Local to one node: log and mark it KO.
    Access(FsError),
    /// Ctrl+C: stop descending, emit nothing more.
    Interrupted,
    /// Store failure: abort the run.
    Fatal(anyhow::Error),
}

impl From<FsError> for WalkError {
    fn from(e: FsError) -> Self {
        if e.is_fatal() {
            WalkError::Fatal(e.into())
        } else {
            WalkError::Access(e)
        }
    }
}

impl From<anyhow::Error> for WalkError {
    fn from(e: anyhow::Error) -> Self {
        WalkError::Fatal(e)
    }
}

/// Outcome of the content step for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentChange {
    Unchanged,
    New,
    Updated,
}

/// What one run produced.
#[derive(Debug)]
pub struct CrawlReport {
    pub generation: i64,
    pub stats: CrawlStats,
    /// Final status per requested root, in request order.
    pub statuses: Vec<(String, Status)>,
    pub misses: MappingMisses,
    pub interrupted: bool,
}

pub struct Crawler<'a> {
    fs: &'a dyn FsProxy,
    store: &'a mut dyn DocumentStore,
    filter: &'a PathFilter,
    acls: AclCache,
    opts: CrawlOpts,
    generation: i64,
    stats: CrawlStats,
    cancel: Option<Arc<AtomicBool>>,
    interrupted: bool,
    progress: EmitCounter,
}

impl<'a> Crawler<'a> {
    /// Starts a new run generation in `store`.
    pub fn new(
        fs: &'a dyn FsProxy,
        store: &'a mut dyn DocumentStore,
        filter: &'a PathFilter,
        acls: AclCache,
        opts: CrawlOpts,
    ) -> Result<Self> {
        let generation = store.begin_run()?;
        let bar = opts.verbose.then(|| create_counter("Crawling"));
        Ok(Self {
            fs,
            store,
            filter,
            acls,
            opts,
            generation,
            stats: CrawlStats::default(),
            cancel: None,
            interrupted: false,
            progress: EmitCounter::new(bar),
        })
    }

    /// Stop the walk as soon as `flag` turns true.
    pub fn with_cancel(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Crawl one root CID, flush, then reconcile deletions for this backend.
    /// Roots of another protocol (or none we know) are skipped with `Ok(Status::Ok)`.
    pub fn process(&mut self, identifier: &str) -> Result<Status> {
        let cid: Cid = match identifier.parse() {
            Ok(cid) => cid,
            Err(e) => {
                error!("Cannot process {}: {}", identifier, e);
                return Ok(Status::Ko);
            }
        };
        if cid.protocol() != Some(self.fs.protocol()) {
            info!(
                "{} is not managed by the {} backend - skipping",
                cid,
                self.fs.protocol()
            );
            return Ok(Status::Ok);
        }

        info!("Processing root: {}", cid);
        let mut doc = self.get_or_create(&cid.to_string())?;
        let walked = match self.fs.create_url_from_cid(&cid) {
            Ok(location) => self.process_location(&location, &mut doc),
            Err(e) => Err(WalkError::Access(e)),
        };
        match walked {
            Ok(()) => self.emit(&doc)?,
            Err(WalkError::Access(e)) => {
                error!("Could not process {}: {}", cid, e);
                self.emit(&doc)?;
            }
            Err(WalkError::Interrupted) => warn!("Crawl interrupted: {} not emitted", cid),
            Err(WalkError::Fatal(e)) => return Err(e),
        }
        self.store.flush()?;

        if self.interrupted {
            warn!("Interrupted walk: skipping deletion reconciliation");
        } else {
            self.stats.deleted_files +=
                reconcile(self.fs, &mut *self.store, self.filter, self.generation)?;
        }
        Ok(doc.status)
    }

    /// Stats, mapping misses and per-root statuses for the teardown.
    pub fn finish(mut self, statuses: Vec<(String, Status)>) -> CrawlReport {
        self.progress.finish();
        CrawlReport {
            generation: self.generation,
            stats: self.stats,
            statuses,
            misses: self.acls.misses().clone(),
            interrupted: self.interrupted,
        }
    }

    fn process_location(&mut self, location: &Location, doc: &mut Document) -> Result<(), WalkError> {
        if self.fs.check_if_dir_exists(location)? {
            return self.process_directory(location, doc);
        }
        match self.process_file(location, doc) {
            Ok(change) => self.count(change),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => error!("Could not load file {}: {}", location.local, e),
        }
        Ok(())
    }

    /// AUX when the listing worked, KO otherwise. Children are emitted as they finish.
    fn process_directory(&mut self, location: &Location, doc: &mut Document) -> Result<(), WalkError> {
        debug!("Start processing directory: {}", location.local);
        self.stats.directories += 1;
        match self.walk_directory(location, doc) {
            Ok(()) => {
                doc.status = Status::Aux;
                Ok(())
            }
            Err(WalkError::Access(e)) => {
                error!("Could not load directory {}: {}", location.local, e);
                doc.status = Status::Ko;
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn walk_directory(&mut self, location: &Location, doc: &mut Document) -> Result<(), WalkError> {
        if self.opts.secured {
            self.refresh_security(location, doc)?;
        }
        let files = self.fs.list_files(location)?;
        let subdirs = self.fs.list_subdirectories(location)?;

        for path in &files {
            self.check_cancel()?;
            if !self.filter.accept(path) {
                debug!("Skipping ignored file: {}", path);
                continue;
            }
            self.visit_file(path)?;
        }
        for path in &subdirs {
            self.check_cancel()?;
            if !self.filter.accept(path) {
                debug!("Skipping ignored directory: {}", path);
                continue;
            }
            self.visit_directory(path)?;
        }
        Ok(())
    }

    /// Only `Interrupted` / `Fatal` escape: access problems stay on the child.
    fn visit_file(&mut self, path: &str) -> Result<(), WalkError> {
        let location = match self.fs.create_url(path) {
            Ok(l) => l,
            Err(e) => {
                error!("Could not resolve {}: {}", path, e);
                return Ok(());
            }
        };
        let mut doc = self.get_or_create(&location.cid.to_string())?;
        match self.process_file(&location, &mut doc) {
            Ok(change) => {
                self.count(change);
                self.emit(&doc)?;
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) if self.opts.skip_non_readable_files => {
                warn!("Non readable file {} skipped: {}", path, e);
            }
            Err(e) => {
                warn!("Non readable file {}: {}", path, e);
                self.emit(&doc)?;
            }
        }
        Ok(())
    }

    fn visit_directory(&mut self, path: &str) -> Result<(), WalkError> {
        let location = match self.fs.create_url(path) {
            Ok(l) => l,
            Err(e) => {
                error!("Could not resolve {}: {}", path, e);
                return Ok(());
            }
        };
        let mut doc = self.get_or_create(&location.cid.to_string())?;
        self.process_directory(&location, &mut doc)?;
        self.emit(&doc)?;
        Ok(())
    }

    /// Stats are left to the caller: a file only counts once it is emitted.
    fn process_file(&mut self, location: &Location, doc: &mut Document) -> FsResult<ContentChange> {
        debug!("LOADING file: {}", location.local);
        let change = self.refresh_content(location, doc)?;
        if self.opts.secured {
            self.refresh_security(location, doc)?;
        }
        doc.status = Status::Ok;
        Ok(change)
    }

    fn refresh_content(&mut self, location: &Location, doc: &mut Document) -> FsResult<ContentChange> {
        let mtime = self.fs.read_mtime(location)?;
        let previous = match &doc.content {
            Some(layer) if !layer.is_obsolete(mtime) => return Ok(ContentChange::Unchanged),
            Some(_) => Some(doc.content_hash.clone()),
            None => None,
        };
        let data = self.fs.read_content(location)?;
        doc.set_content(data, mtime);
        Ok(match previous {
            None => ContentChange::New,
            Some(hash) if hash == doc.content_hash => {
                debug!("Content of {} unchanged despite newer mtime", location.local);
                ContentChange::Unchanged
            }
            Some(_) => ContentChange::Updated,
        })
    }

    fn count(&mut self, change: ContentChange) {
        match change {
            ContentChange::New => self.stats.new_files += 1,
            ContentChange::Updated => self.stats.updated_files += 1,
            ContentChange::Unchanged => {}
        }
    }

    /// ACL layer by ctime staleness (a fresh stored layer seeds the cache), then SAR.
    fn refresh_security(&mut self, location: &Location, doc: &mut Document) -> FsResult<()> {
        let ctime = self.fs.read_ctime(location)?;
        let fresh = doc
            .acl
            .as_ref()
            .filter(|layer| !layer.is_obsolete(ctime))
            .map(|layer| layer.data.clone());
        match fresh {
            Some(acl) => self.acls.add(&location.local, acl),
            None => {
                let acl = self.acls.get_or_build(self.fs, &location.local)?;
                doc.acl = Some(Layer::new(acl, ctime));
            }
        }
        let sar = compute_sar(self.fs, &mut self.acls, &location.local)?;
        doc.sar = Some(Layer::new(sar, now_secs()));
        Ok(())
    }

    /// Stored document or a fresh one; KO either way until processing proves otherwise.
    fn get_or_create(&mut self, cid: &str) -> Result<Document> {
        let mut doc = self
            .store
            .get(cid)?
            .unwrap_or_else(|| Document::new(cid));
        doc.status = Status::Ko;
        Ok(doc)
    }

    fn emit(&mut self, doc: &Document) -> Result<()> {
        debug!("Emit {} [{}]", doc.cid, doc.status);
        self.store.send(doc)?;
        self.progress.tick();
        Ok(())
    }

    fn check_cancel(&mut self) -> Result<(), WalkError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            self.interrupted = true;
            return Err(WalkError::Interrupted);
        }
        Ok(())
    }
}

/// Everything a run needs besides the backend and the store.
pub struct CrawlParams<'a> {
    pub filter: &'a PathFilter,
    pub acls: AclCache,
    pub opts: CrawlOpts,
    pub roots: &'a [String],
    /// Attach and detach the backend around the walk.
    pub connect: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Connect, crawl every root, disconnect, then log mapping misses and stats.
/// The backend is disconnected even when the walk fails.
pub fn run_crawl(
    fs: &mut dyn FsProxy,
    store: &mut dyn DocumentStore,
    params: CrawlParams<'_>,
) -> Result<CrawlReport> {
    let connect = params.connect;
    if connect {
        fs.connect()?;
    }
    let walk = crawl_roots(&*fs, store, params);
    if connect && let Err(e) = fs.disconnect() {
        if walk.is_ok() {
            return Err(e.into());
        }
        error!("Disconnect failed after an aborted crawl: {}", e);
    }
    let report = walk?;
    report.misses.log_warnings();
    log_stats(&report.stats);
    Ok(report)
}

fn crawl_roots(
    fs: &dyn FsProxy,
    store: &mut dyn DocumentStore,
    params: CrawlParams<'_>,
) -> Result<CrawlReport> {
    let mut crawler = Crawler::new(fs, store, params.filter, params.acls, params.opts)?
        .with_cancel(params.cancel);
    let mut statuses = Vec::with_capacity(params.roots.len());
    for root in params.roots {
        if crawler.is_interrupted() {
            break;
        }
        let status = crawler.process(root)?;
        statuses.push((root.clone(), status));
    }
    Ok(crawler.finish(statuses))
}

pub fn log_stats(stats: &CrawlStats) {
    info!(
        "Found {} new {} in {} {}",
        stats.new_files,
        plural(stats.new_files, "file", "files"),
        stats.directories,
        plural(stats.directories, "directory", "directories")
    );
    if stats.updated_files > 0 {
        info!(
            "Updated {} {}",
            stats.updated_files,
            plural(stats.updated_files, "file", "files")
        );
    }
    if stats.deleted_files > 0 {
        info!(
            "Found {} deleted {}",
            stats.deleted_files,
            plural(stats.deleted_files, "file", "files")
        );
    }
}
