//! Spinner shown while a URL's trials run.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICKS: &str = "\u{25b8}\u{25b9}\u{25b8}\u{25b9}\u{25b8}";

/// Create a spinner for one URL, or a hidden bar when output is suppressed.
pub fn create_spinner(message: &str, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICKS),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Message for a spinner after `done` of `total` trials.
pub fn trial_message(url: &str, done: usize, total: usize, last_probability: f64) -> String {
    format!("{url} \x1b[2mtrial {done}/{total}, last {last_probability:.2}%\x1b[0m")
}
