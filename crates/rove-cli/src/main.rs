//! Rove CLI entry point.
//!
//! Parses arguments, initializes logging and dispatches the command.

use clap::Parser;
use miette::Result;
use rove_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);
    ui::set_quiet(args.quiet);

    let result = match args.command {
        cli::Command::Serve(serve_args) => commands::serve_execute(serve_args).await,
    };

    // Convert CLI errors to miette diagnostics for readable error reporting
    result.map_err(error::cli_error_to_miette)
}
