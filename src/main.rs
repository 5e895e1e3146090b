//! fsload CLI: crawl an NFS export or SMB share into the document store.

use anyhow::Result;
use clap::Parser;
use fsload::engine::arg_parser::Cli;
use fsload::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
