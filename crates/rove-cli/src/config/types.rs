use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::defaults::*;

/// Fully resolved serve options.
///
/// This is the plain option bag produced by merging defaults, the
/// `serve` section of `rove.config.json`, environment variables and CLI
/// flags. It is turned into an immutable [`crate::serve::ServeConfig`] by a
/// single validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServeOptions {
    /// Host to listen on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve using HTTPS
    #[serde(default)]
    pub ssl: bool,

    /// PEM private key used when `ssl` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<PathBuf>,

    /// PEM certificate chain used when `ssl` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<PathBuf>,

    /// Proxy configuration file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_config: Option<PathBuf>,

    /// Reload the page on change
    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// URL the live-reload browser client connects to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_reload_client: Option<String>,

    /// Hot module replacement
    #[serde(default)]
    pub hmr: bool,

    /// Rebuild on change
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Serve the existing output directory instead of rebuilding
    #[serde(default)]
    pub use_dist: bool,

    /// Open the served URL in the default browser
    #[serde(default)]
    pub open: bool,

    /// Directory the build writes to and the server reads from
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Project root; relative paths are resolved against it
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Shell command that produces the output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,

    /// Debounce window for coalescing file changes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Longest a rebuild is held back while changes keep arriving
    #[serde(default = "default_debounce_max_wait_ms")]
    pub debounce_max_wait_ms: u64,

    /// Ports probed above the default before giving up
    #[serde(default = "default_port_scan_attempts")]
    pub port_scan_attempts: u16,

    /// Serve index.html for unmatched extension-less paths
    #[serde(default = "default_true")]
    pub spa_fallback: bool,

    /// Upstream timeout for proxied requests
    #[serde(default = "default_proxy_timeout_ms")]
    pub proxy_timeout_ms: u64,

    /// Per-frame send timeout for live-reload clients
    #[serde(default = "default_client_send_timeout_ms")]
    pub client_send_timeout_ms: u64,

    /// Output files whose change always forces a full reload
    #[serde(default = "default_structural_files")]
    pub structural_files: Vec<String>,

    /// Patterns ignored by the file watcher
    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl: false,
            ssl_key: None,
            ssl_cert: None,
            proxy_config: None,
            live_reload: true,
            live_reload_client: None,
            hmr: false,
            watch: true,
            use_dist: false,
            open: false,
            out_dir: default_out_dir(),
            root: default_root(),
            build_command: None,
            debounce_ms: default_debounce_ms(),
            debounce_max_wait_ms: default_debounce_max_wait_ms(),
            port_scan_attempts: default_port_scan_attempts(),
            spa_fallback: true,
            proxy_timeout_ms: default_proxy_timeout_ms(),
            client_send_timeout_ms: default_client_send_timeout_ms(),
            structural_files: default_structural_files(),
            watch_ignore: default_watch_ignore(),
        }
    }
}

/// Options plus the port that was in effect before CLI flags were applied.
///
/// The port negotiator only substitutes a busy port when the requested port
/// *is* this default; an explicitly chosen port must not be overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub options: ServeOptions,
    pub default_port: u16,
}
