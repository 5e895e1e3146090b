use clap::Parser;
use std::path::PathBuf;

use crate::types::Opts;

/// Crawl a network share into the document store, refreshing stale content and
/// access layers and removing documents that disappeared.
#[derive(Clone, Parser)]
#[command(name = "fsload")]
#[command(about = "Crawl an NFS export or SMB share into the document store.")]
pub struct Cli {
    /// Root CIDs to crawl (e.g. nfs://host/export/docs). Default: the configured root.
    #[arg(value_name = "ROOT")]
    pub roots: Vec<String>,

    /// Config file. Default: `fsload.toml` in the working directory.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Document store path. Default: `.fsload` in the working directory.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Verbose output (debug logs and a document counter).
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Compute ACL and SAR layers.
    #[arg(long, short = 's', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub secured: Option<bool>,

    /// The share is already attached: do not mount or unmount it.
    #[arg(long)]
    pub no_connect: bool,

    /// Prompt for the SMB password when neither the config nor the environment has one.
    #[arg(long)]
    pub ask_password: bool,
}

impl Cli {
    pub fn to_opts(&self) -> Opts {
        Opts {
            config_path: self.config.clone(),
            db_path: self.db.clone(),
            roots: self.roots.clone(),
            secured: self.secured,
            no_connect: self.no_connect,
            ask_password: self.ask_password,
            verbose: self.verbose,
        }
    }
}
