//! Colored status output for jdk-cache
//!
//! Uses owo-colors for terminal colors. Everything goes to stderr so that
//! stdout stays free for the installed path the CLI prints.

use owo_colors::OwoColorize;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence status lines; errors are still printed.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print an action header (blue, bold)
/// Example: "==> Acquiring ADOPTIUM_21_jdk_linux_x64_..."
pub fn action(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "==>".blue().bold(), message.bold());
    }
}

/// Print a detail line (dimmed)
/// Example: "     downloading https://..."
pub fn detail(message: &str) {
    if !is_quiet() {
        eprintln!("     {}", message.dimmed());
    }
}

/// Print a success message (green)
pub fn success(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "==>".green().bold(), message.green());
    }
}

/// Print an info message (cyan)
pub fn info(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "::".cyan(), message);
    }
}

/// Print a warning message (yellow)
pub fn warning(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
    }
}

/// Print an error message (red)
pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message.red());
}

/// Print a skip message (dimmed)
/// Example: "==> found cached JDK ..., skipping download"
pub fn skip(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "==>".dimmed(), message.dimmed());
    }
}
