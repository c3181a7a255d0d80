//! Progress bar utilities for displaying run status

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Bar over the number of enumerated items.
pub fn create_progress_bar(total: usize, desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = total,
        desc = desc,
        animation = Animation::Classic,
        unit = " items"
    )))
}

/// Advance the bar. Uses try_lock so a contended bar never blocks the caller.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Advance the bar when one is shown.
pub fn tick(pb: Option<&ProgressBar>) {
    if let Some(pb) = pb {
        update_progress_bar(pb, 1);
    }
}

/// Move to a new line so log output after the run does not overwrite the bar.
pub fn finish_bar(pb: Option<&ProgressBar>) {
    if let Some(pb) = pb
        && let Ok(mut bar) = pb.lock()
    {
        let _ = bar.refresh();
        eprintln!();
    }
}
