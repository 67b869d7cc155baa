use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::cli::validation::{parse_client_url, parse_host};
use crate::config::ServeOptions;

/// Available Rove subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and serve the app, rebuilding on file changes
    ///
    /// Runs the configured build command, serves the output directory over
    /// HTTP(S), forwards proxied paths upstream and notifies connected
    /// browsers when a rebuild completes.
    #[command(visible_aliases = ["server", "s"])]
    Serve(ServeArgs),
}

/// Options shared by every command that runs the build.
///
/// Serve flattens this group rather than redefining it, so build and serve
/// options stay in one place.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Output directory the build writes to
    #[arg(short = 'd', long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Shell command that builds the project into the output directory
    ///
    /// Without a build command the output directory itself is watched and
    /// served, which suits tools that run their own watch mode.
    #[arg(short = 'b', long, value_name = "CMD")]
    pub build_command: Option<String>,

    /// Project root (defaults to the current directory)
    #[arg(long, visible_alias = "cwd", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Path to the config file (defaults to rove.config.json in the root)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Rebuild on change
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub watch: Option<bool>,
}

/// Arguments for the serve command
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub build: BuildArgs,

    /// Port to listen to for serving
    ///
    /// If this is the default port and it is busy, the next free port is
    /// used. An explicitly chosen port that is busy is an error.
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host to listen on (localhost by default)
    #[arg(short = 'H', long, value_name = "HOST", value_parser = parse_host)]
    pub host: Option<String>,

    /// Proxy configuration file
    #[arg(long, visible_alias = "pc", value_name = "FILE")]
    pub proxy_config: Option<PathBuf>,

    /// Serve using HTTPS
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub ssl: Option<bool>,

    /// SSL key to use for serving HTTPS
    #[arg(long, value_name = "FILE")]
    pub ssl_key: Option<PathBuf>,

    /// SSL certificate to use for serving HTTPS
    #[arg(long, value_name = "FILE")]
    pub ssl_cert: Option<PathBuf>,

    /// Open the URL in the default browser
    #[arg(short = 'o', long)]
    pub open: bool,

    /// Reload the page on change using live-reload
    #[arg(long, visible_alias = "lr", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub live_reload: Option<bool>,

    /// URL the live-reload browser client will use
    #[arg(long, value_name = "URL", value_parser = parse_client_url)]
    pub live_reload_client: Option<String>,

    /// Enable hot module replacement
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub hmr: Option<bool>,

    /// Serve the files already in the output directory instead of rebuilding
    #[arg(long, visible_alias = "ud", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub use_dist: Option<bool>,

    /// Debounce window for file changes, in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Longest a rebuild waits while changes keep arriving, in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_max_wait_ms: Option<u64>,

    /// Serve index.html for unknown extension-less paths
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub spa_fallback: Option<bool>,
}

impl ServeArgs {
    /// Overlay explicitly given flags onto loaded options.
    pub fn apply_to(&self, options: &mut ServeOptions) {
        let build = &self.build;
        if let Some(root) = &build.root {
            options.root = root.clone();
        }
        if let Some(out_dir) = &build.out_dir {
            options.out_dir = out_dir.clone();
        }
        if let Some(command) = &build.build_command {
            options.build_command = Some(command.clone());
        }
        if let Some(watch) = build.watch {
            options.watch = watch;
        }

        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        if let Some(path) = &self.proxy_config {
            options.proxy_config = Some(path.clone());
        }
        if let Some(ssl) = self.ssl {
            options.ssl = ssl;
        }
        if let Some(key) = &self.ssl_key {
            options.ssl_key = Some(key.clone());
        }
        if let Some(cert) = &self.ssl_cert {
            options.ssl_cert = Some(cert.clone());
        }
        if self.open {
            options.open = true;
        }
        if let Some(live_reload) = self.live_reload {
            options.live_reload = live_reload;
        }
        if let Some(url) = &self.live_reload_client {
            options.live_reload_client = Some(url.clone());
        }
        if let Some(hmr) = self.hmr {
            options.hmr = hmr;
        }
        if let Some(use_dist) = self.use_dist {
            options.use_dist = use_dist;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            options.debounce_ms = debounce_ms;
        }
        if let Some(max_wait) = self.debounce_max_wait_ms {
            options.debounce_max_wait_ms = max_wait;
        }
        if let Some(spa_fallback) = self.spa_fallback {
            options.spa_fallback = spa_fallback;
        }
    }
}
