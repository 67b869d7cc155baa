//! Miette diagnostic conversion for CLI errors.
//!
//! This module provides conversion from CLI errors to miette reports so the
//! process boundary prints readable, hint-carrying diagnostics.

use crate::error::{CliError, ServeError};
use miette::Report;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Serve(e) => serve_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

/// Convert ServeError to miette Report
pub fn serve_error_to_miette(err: ServeError) -> Report {
    match err {
        ServeError::PortUnavailable { host, port, hint } => miette::miette!(
            code = "rove::port_unavailable",
            help = hint,
            "Port {} is not available on {}",
            port,
            host
        ),
        ServeError::InvalidTlsMaterial { reason } => miette::miette!(
            code = "rove::invalid_tls",
            help = "Provide PEM encoded files with --ssl-key and --ssl-cert",
            "Invalid TLS material: {}",
            reason
        ),
        ServeError::Bind { addr, source } => miette::miette!(
            code = "rove::bind",
            help = "Another process may have taken the port after it was probed; try again",
            "Failed to bind to {}: {}",
            addr,
            source
        ),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_unavailable_report_carries_port() {
        let report = cli_error_to_miette(CliError::Serve(ServeError::PortUnavailable {
            host: "localhost".to_string(),
            port: 4300,
            hint: "Pick another port".to_string(),
        }));
        assert!(report.to_string().contains("4300"));
    }
}
