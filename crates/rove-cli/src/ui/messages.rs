//! Status lines for the operator.
//!
//! Everything goes to stderr so stdout stays free for piping. `--quiet`
//! silences `success` and `info`; warnings and errors are always printed.

use owo_colors::OwoColorize;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);

/// Suppress non-essential status lines.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message to stderr.
///
/// ```no_run
/// use rove_cli::ui::success;
///
/// success("Rebuild completed in 12ms");
/// ```
pub fn success(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "✓".green().bold(), message);
    }
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "ℹ".blue().bold(), message);
    }
}

/// Print a warning message to stderr.
///
/// ```no_run
/// use rove_cli::ui::warning;
///
/// warning("Port 4200 is busy, using port 4201 instead");
/// ```
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}
