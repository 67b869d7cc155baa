//! Terminal UI utilities: status lines and formatted output.
//!
//! # Examples
//!
//! ```no_run
//! use rove_cli::ui;
//!
//! ui::init_colors(false);
//! ui::info("Starting development server...");
//! ui::success("Initial build completed in 120ms");
//! ```

mod format;
mod messages;

pub use format::{format_duration, format_size, print_serve_banner};
pub use messages::{error, info, set_quiet, success, warning};

/// Check if running in a CI environment.
pub fn is_ci() -> bool {
    std::env::var("CI").is_ok()
        || std::env::var("GITHUB_ACTIONS").is_ok()
        || std::env::var("GITLAB_CI").is_ok()
        || std::env::var("CIRCLECI").is_ok()
        || std::env::var("TRAVIS").is_ok()
}

/// Initialize color support based on environment.
///
/// `owo-colors` reads `NO_COLOR` by itself; an explicit `--no-color` or a CI
/// run without a terminal also disables the `console` styling.
pub fn init_colors(no_color: bool) {
    if no_color || (is_ci() && !console::user_attended_stderr()) {
        console::set_colors_enabled_stderr(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_is_ci_with_ci_var() {
        std::env::set_var("CI", "true");
        assert!(is_ci());
        std::env::remove_var("CI");
    }

    #[test]
    fn test_init_colors() {
        init_colors(true);
    }
}
