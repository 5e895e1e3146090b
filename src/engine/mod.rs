//! Engine module: crawl, reconciliation, CLI and the SQLite document store

pub mod arg_parser;
pub mod cli;
pub mod core;
pub mod db_ops;
pub mod hashing;
pub mod progress;
pub mod reconcile;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::{check_mapping_threshold, handle_run};
pub use core::{CrawlParams, CrawlReport, Crawler, log_stats, run_crawl};
pub use db_ops::{SqliteStore, open_db, open_db_in_memory};
pub use hashing::content_digest;
pub use reconcile::reconcile;
pub use tools::now_secs;
