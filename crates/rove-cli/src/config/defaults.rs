use std::path::PathBuf;

/// Name of the project configuration file looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "rove.config.json";

pub fn default_host() -> String {
    "localhost".to_string()
}

pub fn default_port() -> u16 {
    4200
}

pub fn default_true() -> bool {
    true
}

pub fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

pub fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Quiet window before a rebuild starts; bulk file operations settle inside it.
pub fn default_debounce_ms() -> u64 {
    50
}

pub fn default_debounce_max_wait_ms() -> u64 {
    500
}

/// How many ports above the default are probed before giving up.
pub fn default_port_scan_attempts() -> u16 {
    20
}

pub fn default_proxy_timeout_ms() -> u64 {
    30_000
}

/// How long a live-reload client may stall a single frame before it is dropped.
pub fn default_client_send_timeout_ms() -> u64 {
    2_000
}

/// Output files whose change always forces a full reload.
pub fn default_structural_files() -> Vec<String> {
    vec!["index.html".to_string()]
}

pub fn default_watch_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "target".to_string(),
        "*.log".to_string(),
        "*.swp".to_string(),
        "*~".to_string(),
    ]
}
