//! Configuration loading for the serve command.
//!
//! Merges settings from CLI args, environment variables and the config file.
//! Priority: CLI > `PORT` > `ROVE_*` environment > `rove.config.json` > defaults.
//!
//! The result is a plain [`ServeOptions`] bag; turning it into the immutable,
//! validated [`crate::serve::ServeConfig`] happens exactly once, at startup.

mod defaults;
mod loading;
pub mod proxy;
mod types;

pub use defaults::*;
pub use proxy::{load_proxy_config, parse_proxy_config, PathRewrite, ProxyRule};
pub use types::*;
