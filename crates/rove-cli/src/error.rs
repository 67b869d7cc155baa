//! Error handling for the Rove CLI.
//!
//! This module provides a hierarchical error type system using `thiserror`.
//! Each variant is meant to be actionable: it says what went wrong and, where
//! it helps, how to fix it.
//!
//! # Architecture
//!
//! - **Top-level errors** (`CliError`) represent broad categories of failures
//! - **Domain-specific errors** (`ConfigError`, `ServeError`,
//!   `ProxyUpstreamError`) carry detailed context
//! - **Error conversion** is automatic via `#[from]` attributes
//! - **Context helpers** (`ResultExt`) attach paths, hints and messages
//!
//! # Severity
//!
//! `ServeError` mirrors how the orchestrator treats failures:
//!
//! - fatal at startup: `PortUnavailable`, `InvalidTlsMaterial`, `Bind`
//! - recoverable: `BuildFailed` (last good output keeps being served),
//!   `ProxyUpstream` (one request fails), `ClientChannel` (one client dropped)

pub mod miette;

pub use self::miette::cli_error_to_miette;

use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
///
/// This is the primary error type returned by CLI commands. It automatically
/// converts from domain-specific errors via `From` implementations.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration-related errors (file not found, invalid syntax, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Development server errors
    #[error(transparent)]
    Serve(#[from] ServeError),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
///
/// These errors occur while loading `rove.config.json`, environment overrides
/// and the proxy configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file doesn't exist at the expected location
    #[error("Config file not found: {}\n\nHint: Create a rove.config.json file or pass --config <path>", .0.display())]
    NotFound(PathBuf),

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },

    /// Proxy configuration could not be parsed into an ordered rule list
    #[error("Invalid proxy configuration in {}: {reason}\n\nHint: Expected an array of {{\"path\", \"target\"}} objects or an object keyed by path", .path.display())]
    InvalidProxyConfig {
        /// Proxy config file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },
}

/// Errors raised by the serve orchestrator and its components.
#[derive(Debug, Error)]
pub enum ServeError {
    /// An explicitly requested port is busy, or no free port was found while
    /// scanning from the default port.
    #[error("Port {port} is not available on {host}\n\nHint: {hint}")]
    PortUnavailable {
        /// Host the port was probed on
        host: String,
        /// The port that could not be used
        port: u16,
        /// Helpful hint for resolving the conflict
        hint: String,
    },

    /// TLS was requested but the key/cert pair is missing or malformed.
    #[error("Invalid TLS material: {reason}\n\nHint: Provide PEM encoded files with --ssl-key and --ssl-cert")]
    InvalidTlsMaterial {
        /// What was wrong with the material
        reason: String,
    },

    /// A build failed. Recoverable: the last good output keeps being served.
    #[error("Build failed: {0}")]
    BuildFailed(String),

    /// An upstream proxy target failed for a single request.
    #[error(transparent)]
    ProxyUpstream(#[from] ProxyUpstreamError),

    /// A live-reload client could not be reached and was dropped.
    #[error("Live-reload client {client} dropped: {reason}")]
    ClientChannel {
        /// Client connection id
        client: u64,
        /// Reason for the drop
        reason: String,
    },

    /// The listening socket could not be bound.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// Address that failed to bind
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an unrecoverable error while running.
    #[error("Server error: {0}")]
    Server(String),

    /// The file watcher could not be started.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Failure talking to a proxy upstream.
///
/// Surfaced to the requesting client as a gateway-style response; it never
/// falls back to serving local assets.
#[derive(Debug, Error)]
pub enum ProxyUpstreamError {
    /// Could not open a connection to the upstream.
    #[error("Upstream {target} unreachable: {reason}")]
    Connect {
        /// Upstream URL that was requested
        target: String,
        /// Underlying failure
        reason: String,
    },

    /// The upstream did not answer in time.
    #[error("Upstream {target} timed out after {timeout_ms}ms")]
    Timeout {
        /// Upstream URL that was requested
        target: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// The request could not be forwarded (bad URL, body error, ...).
    #[error("Failed to forward request to {target}: {reason}")]
    Request {
        /// Upstream URL that was requested
        target: String,
        /// Underlying failure
        reason: String,
    },
}

impl ProxyUpstreamError {
    /// HTTP status code returned to the client for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyUpstreamError::Timeout { .. } => 504,
            ProxyUpstreamError::Connect { .. } | ProxyUpstreamError::Request { .. } => 502,
        }
    }
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Add a file path to the error context.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use rove_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let path = Path::new("proxy.conf.json");
    /// std::fs::read_to_string(path).with_path(path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error with a custom message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            match err {
                CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    CliError::FileNotFound(path.as_ref().to_path_buf())
                }
                other => other,
            }
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}
