//! Logging infrastructure for the Rove CLI.
//!
//! Structured logging built on the `tracing` ecosystem. Operator-facing status
//! lines go through [`crate::ui`]; everything else (probe results, rebuild
//! coalescing, proxy forwarding, client churn) is emitted as tracing events.
//!
//! # Example
//!
//! ```rust,no_run
//! use rove_cli::logger::init_logger;
//! use tracing::{debug, info};
//!
//! init_logger(false, false, false);
//!
//! info!("Starting server");
//! debug!(port = 4200, "Probing port");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "rove=debug,rove_cli=debug,tower_http=debug";
const QUIET_FILTER: &str = "rove=error,rove_cli=error";
const DEFAULT_FILTER: &str = "rove=info,rove_cli=info";

/// Initialize the tracing subscriber with the specified options.
///
/// The logging level is determined in this order:
/// 1. `--verbose` flag: DEBUG for rove crates
/// 2. `--quiet` flag: ERROR only
/// 3. `RUST_LOG` environment variable: custom filter
/// 4. Default: INFO for rove crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    init_logger_with_filter(filter, no_color);
}

/// Initialize logger with a custom environment filter.
///
/// Uses `try_init` so repeated initialization (integration tests spinning up
/// several servers in one process) is harmless.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Check if colored output should be enabled.
///
/// - `NO_COLOR`: if set, disables colors
/// - `FORCE_COLOR`: if set, forces colors even in non-TTY
pub fn should_use_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_should_use_colors_respects_no_color() {
        std::env::set_var("NO_COLOR", "1");
        std::env::set_var("FORCE_COLOR", "1");
        assert!(!should_use_colors());
        std::env::remove_var("NO_COLOR");
        std::env::remove_var("FORCE_COLOR");
    }

    #[test]
    #[serial]
    fn test_should_use_colors_respects_force_color() {
        std::env::remove_var("NO_COLOR");
        std::env::set_var("FORCE_COLOR", "1");
        assert!(should_use_colors());
        std::env::remove_var("FORCE_COLOR");
    }

    #[test]
    fn test_filters_parse() {
        let _ = EnvFilter::new(VERBOSE_FILTER);
        let _ = EnvFilter::new(QUIET_FILTER);
        let _ = EnvFilter::new(DEFAULT_FILTER);
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logger(false, true, true);
        init_logger(false, true, true);
    }
}
