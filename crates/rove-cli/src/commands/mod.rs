//! Command implementations for the Rove CLI.
//!
//! - [`serve`] - Build, serve, watch and notify connected browsers
//!
//! Each command provides an `execute` function that takes the parsed command
//! arguments and returns a Result.

pub mod serve;

pub use serve::execute as serve_execute;
