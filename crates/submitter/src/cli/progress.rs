//! Terminal progress bar driven by [`ProgressTracker`] updates.

use std::sync::OnceLock;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::app::traversal::{ProgressTracker, ProgressUpdate};

const RESOLUTION: u64 = 1000;

fn bar_style() -> ProgressStyle {
    static STYLE: OnceLock<ProgressStyle> = OnceLock::new();
    STYLE
        .get_or_init(|| {
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ")
        })
        .clone()
}

/// A tracker whose updates move an `indicatif` bar on stderr.
///
/// The bar is hidden when `visible` is false or stderr is not a terminal.
pub fn tracker_with_bar(visible: bool) -> (ProgressTracker, ProgressBar) {
    let target = if visible {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let bar = ProgressBar::with_draw_target(Some(RESOLUTION), target);
    bar.set_style(bar_style());

    let observed = bar.clone();
    let tracker = ProgressTracker::new().with_observer(move |update: &ProgressUpdate| {
        observed.set_position(position(update.fraction));
        if let Some(message) = &update.message {
            observed.set_message(message.clone());
        }
    });
    (tracker, bar)
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * RESOLUTION as f64).round() as u64
}
