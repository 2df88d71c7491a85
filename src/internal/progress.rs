//! Progress display for downloads and extraction
//!
//! Every bar is drawn on stderr; when display is off the bar is hidden but
//! still counts, so callers never branch on visibility.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(80);

#[derive(Clone, Copy)]
enum Look {
    Spinner,
    Bytes,
}

fn style(look: Look) -> ProgressStyle {
    match look {
        Look::Spinner => ProgressStyle::default_spinner()
            .template("     {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        Look::Bytes => ProgressStyle::default_bar()
            .template("     {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸━"),
    }
}

/// Spinner labelled `message`; hidden unless `visible`.
pub fn create_spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner()
        .with_style(style(Look::Spinner))
        .with_message(message.to_owned());
    pb.enable_steady_tick(TICK);
    pb
}

/// Switch to a byte bar once the response length is known.
pub fn upgrade_to_bytes(pb: &ProgressBar, total_bytes: u64) {
    pb.set_length(total_bytes);
    pb.set_style(style(Look::Bytes));
}

/// Clears the bar on drop, including early `?` returns.
pub struct ProgressGuard<'a>(&'a ProgressBar);

impl<'a> ProgressGuard<'a> {
    pub fn new(pb: &'a ProgressBar) -> Self {
        Self(pb)
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

pub fn with_spinner<T, E>(
    message: &str,
    visible: bool,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let pb = create_spinner(message, visible);
    let _guard = ProgressGuard::new(&pb);
    f()
}
