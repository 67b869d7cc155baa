//! Rove CLI - development server with live reload and API proxying.
//!
//! # Architecture
//!
//! - [`error`] - Error types with actionable messages
//! - [`logger`] - Structured logging with tracing
//! - [`ui`] - Terminal status lines and the startup banner
//! - [`cli`] - Argument parsing
//! - [`config`] - Layered option loading and proxy config parsing
//! - [`serve`] - Port negotiation, builds, asset serving, proxying and
//!   live reload
//! - [`commands`] - Command entry points
//!
//! # Example
//!
//! ```rust,no_run
//! use rove_cli::config::ServeOptions;
//! use rove_cli::serve::{ServeConfig, ServeOrchestrator};
//!
//! # async fn run() -> rove_cli::Result<()> {
//! let options = ServeOptions {
//!     port: 0,
//!     ..ServeOptions::default()
//! };
//! let config = ServeConfig::from_options(options, 4200)?;
//! let handle = ServeOrchestrator::new(config).start().await?;
//! println!("serving at {}", handle.url());
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod serve;
pub mod ui;

pub use error::{CliError, ConfigError, ProxyUpstreamError, Result, ResultExt, ServeError};
