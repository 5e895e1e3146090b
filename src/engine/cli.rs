//! CLI command handler: load settings, open the store and the backend, crawl, tear down.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Settings;
use crate::engine::arg_parser::Cli;
use crate::engine::core::{CrawlParams, CrawlReport, run_crawl};
use crate::engine::db_ops::SqliteStore;
use crate::fs::open_proxy;
use crate::security::AclCache;
use crate::types::Opts;
use crate::utils::setup_logging;

/// Options plus the validated settings. Logging starts once the file's `verbose` is known.
fn setup_opts(cli: &Cli) -> Result<(Opts, Settings)> {
    let opts = cli.to_opts();
    let (file, dir) = Settings::read_file(&opts)?;
    setup_logging(opts.verbose.or(file.verbose).unwrap_or(false));
    let settings = Settings::from_file(&file, &dir, &opts)?;
    Ok((opts, settings))
}

/// Ctrl+C sets the flag; the walk stops at the next entry.
fn install_cancel_handler() -> Option<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    match ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        Ok(()) => Some(flag),
        Err(e) => {
            warn!("Could not install Ctrl+C handler: {}", e);
            None
        }
    }
}

/// Fail when more distinct identifiers went unmapped than the configured threshold allows.
pub fn check_mapping_threshold(report: &CrawlReport, threshold: Option<usize>) -> Result<()> {
    let Some(limit) = threshold else {
        return Ok(());
    };
    let distinct = report.misses.distinct();
    if distinct > limit {
        bail!(
            "{} identifier(s) without mapping exceed mapping_miss_threshold = {}",
            distinct,
            limit
        );
    }
    Ok(())
}

/// Run one crawl over the configured backend.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, settings) = setup_opts(cli)?;
    if settings.crawl.secured {
        info!("Secured mode: ACL and SAR layers are computed");
    }

    let mut store = SqliteStore::open(&settings.db_path)
        .with_context(|| format!("document store {}", settings.db_path.display()))?;
    let mut fs = open_proxy(&settings.fs)?;

    let roots = if opts.roots.is_empty() {
        vec![settings.fs.resolver().root_cid().to_string()]
    } else {
        opts.roots.clone()
    };
    debug!("Roots: {:?}", roots);

    let params = CrawlParams {
        filter: &settings.filter,
        acls: AclCache::new(settings.fs.acl_builder()),
        opts: settings.crawl.clone(),
        roots: &roots,
        connect: !opts.no_connect,
        cancel: install_cancel_handler(),
    };
    let report = run_crawl(fs.as_mut(), &mut store, params)?;
    debug!("Store status counts: {:?}", store.count_by_status()?);

    check_mapping_threshold(&report, settings.mapping_miss_threshold)?;
    if report.interrupted {
        bail!("Crawl cancelled; documents emitted so far were committed");
    }
    Ok(())
}
