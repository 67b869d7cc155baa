//! Command-line interface definition for Rove.
//!
//! Type-safe argument parsing with clap v4's derive macros.
//!
//! # Command Structure
//!
//! - `rove serve` (aliases `server`, `s`) - build, serve, watch and notify

mod commands;
mod validation;

use clap::Parser;

pub use commands::{BuildArgs, Command, ServeArgs};
pub use validation::{parse_client_url, parse_host};

/// Rove - a development server with live reload and API proxying
#[derive(Parser, Debug)]
#[command(
    name = "rove",
    version,
    about = "Builds and serves your app, rebuilding on file changes",
    long_about = "Rove runs your build in watch mode, serves the output over HTTP or HTTPS,\n\
                  forwards API paths to upstream services and tells connected browsers to\n\
                  reload (or hot-swap modules) whenever a rebuild completes."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
