//! Progress counter for the crawl (verbose mode only).

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

use crate::utils::ProgressConsts;

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " docs"
    )))
}

/// Update progress bar if available
/// Uses try_lock so a contended bar never stalls the walk.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Counts emitted documents and pushes them to the bar in batches.
pub struct EmitCounter {
    bar: Option<ProgressBar>,
    unreported: usize,
}

impl EmitCounter {
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self {
            bar,
            unreported: 0,
        }
    }

    pub fn tick(&mut self) {
        self.unreported += 1;
        if self.unreported >= ProgressConsts::PROGRESS_UPDATE_BATCH_SIZE {
            self.report();
        }
    }

    /// Push the remainder and refresh.
    pub fn finish(&mut self) {
        self.report();
        if let Some(bar) = &self.bar
            && let Ok(mut bar) = bar.try_lock()
        {
            let _ = bar.refresh();
        }
    }

    fn report(&mut self) {
        if let Some(bar) = &self.bar
            && self.unreported > 0
        {
            update_progress_bar(bar, self.unreported);
        }
        self.unreported = 0;
    }
}
