//! Validated, immutable serve configuration.

use crate::config::{load_proxy_config, ProxyRule, ResolvedOptions, ServeOptions};
use crate::error::{ConfigError, Result, ServeError};
use crate::serve::build_watcher::BuildPolicy;
use crate::serve::pipeline::{BuildPipeline, CommandPipeline, OutputDirPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// PEM key and certificate paths. Only exists when both were provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub key: PathBuf,
    pub cert: PathBuf,
}

/// Where file changes are watched, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub root: PathBuf,
    /// Absolute directories inside `root` that never trigger a rebuild
    pub ignored_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Port that may be swapped for a free one when busy
    pub default_port: u16,
    pub tls: Option<TlsMaterial>,
    pub proxy_rules: Vec<ProxyRule>,
    pub live_reload: bool,
    pub live_reload_client: Option<String>,
    pub hmr: bool,
    pub watch: bool,
    pub use_dist: bool,
    pub open: bool,
    /// Absolute project root
    pub root: PathBuf,
    /// Absolute output directory
    pub out_dir: PathBuf,
    pub build_command: Option<String>,
    pub debounce: Duration,
    pub debounce_max_wait: Duration,
    pub port_scan_attempts: u16,
    pub spa_fallback: bool,
    pub proxy_timeout: Duration,
    pub client_send_timeout: Duration,
    pub structural_files: Vec<String>,
    pub watch_ignore: Vec<String>,
}

impl ServeConfig {
    pub fn from_resolved(resolved: ResolvedOptions) -> Result<Self> {
        Self::from_options(resolved.options, resolved.default_port)
    }

    /// Validate `options` once; every later consumer trusts the result.
    ///
    /// # Errors
    ///
    /// - `InvalidTlsMaterial` when `ssl` is on without both key and cert
    /// - `FileNotFound` for a missing root or proxy config
    /// - `InvalidValue` for out-of-range settings
    pub fn from_options(options: ServeOptions, default_port: u16) -> Result<Self> {
        let root = options
            .root
            .canonicalize()
            .map_err(|_| crate::error::CliError::FileNotFound(options.root.clone()))?;

        let tls = if options.ssl {
            let key = options.ssl_key.as_deref().ok_or_else(|| ServeError::InvalidTlsMaterial {
                reason: "ssl is enabled but sslKey is missing".to_string(),
            })?;
            let cert = options.ssl_cert.as_deref().ok_or_else(|| ServeError::InvalidTlsMaterial {
                reason: "ssl is enabled but sslCert is missing".to_string(),
            })?;
            Some(TlsMaterial {
                key: resolve(&root, key),
                cert: resolve(&root, cert),
            })
        } else {
            if options.ssl_key.is_some() || options.ssl_cert.is_some() {
                tracing::debug!("sslKey/sslCert given without ssl, serving plain HTTP");
            }
            None
        };

        if options.proxy_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxyTimeoutMs".to_string(),
                value: "0".to_string(),
                hint: "Use a positive number of milliseconds".to_string(),
            }
            .into());
        }

        if let Some(url) = &options.live_reload_client {
            crate::cli::parse_client_url(url).map_err(|reason| ConfigError::InvalidValue {
                field: "liveReloadClient".to_string(),
                value: url.clone(),
                hint: reason,
            })?;
        }

        let proxy_rules = match &options.proxy_config {
            Some(path) => load_proxy_config(&resolve(&root, path))?,
            None => Vec::new(),
        };

        let build_command = options
            .build_command
            .filter(|command| !command.trim().is_empty());

        Ok(Self {
            host: options.host,
            port: options.port,
            default_port,
            tls,
            proxy_rules,
            live_reload: options.live_reload,
            live_reload_client: options.live_reload_client,
            hmr: options.hmr,
            watch: options.watch,
            use_dist: options.use_dist,
            open: options.open,
            out_dir: resolve(&root, &options.out_dir),
            root,
            build_command,
            debounce: Duration::from_millis(options.debounce_ms),
            debounce_max_wait: Duration::from_millis(
                options.debounce_max_wait_ms.max(options.debounce_ms),
            ),
            port_scan_attempts: options.port_scan_attempts,
            spa_fallback: options.spa_fallback,
            proxy_timeout: Duration::from_millis(options.proxy_timeout_ms),
            client_send_timeout: Duration::from_millis(options.client_send_timeout_ms),
            structural_files: options.structural_files,
            watch_ignore: options.watch_ignore,
        })
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// The live-reload channel is needed for either live reload or HMR.
    pub fn reload_enabled(&self) -> bool {
        self.live_reload || self.hmr
    }

    /// Whether changes lead to new builds at all.
    pub fn rebuilds(&self) -> bool {
        self.watch && !self.use_dist
    }

    /// Run the build command, unless told to reuse output or none is set.
    pub fn pipeline(&self) -> Arc<dyn BuildPipeline> {
        match &self.build_command {
            Some(command) if !self.use_dist => Arc::new(CommandPipeline::new(
                command.clone(),
                self.root.clone(),
                self.out_dir.clone(),
            )),
            _ => Arc::new(OutputDirPipeline::new(self.out_dir.clone())),
        }
    }

    /// With a build command the sources are watched (output excluded);
    /// without one the output directory itself is.
    pub fn watch_target(&self) -> Option<WatchTarget> {
        if !self.rebuilds() {
            return None;
        }
        Some(match self.build_command {
            Some(_) => WatchTarget {
                root: self.root.clone(),
                ignored_dirs: vec![self.out_dir.clone()],
            },
            None => WatchTarget {
                root: self.out_dir.clone(),
                ignored_dirs: Vec::new(),
            },
        })
    }

    pub fn build_policy(&self) -> BuildPolicy {
        BuildPolicy {
            debounce: self.debounce,
            max_wait: self.debounce_max_wait,
            watch: self.rebuilds(),
            structural_files: self.structural_files.clone(),
        }
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use std::fs;
    use tempfile::TempDir;

    fn options(root: &Path) -> ServeOptions {
        ServeOptions {
            root: root.to_path_buf(),
            ..ServeOptions::default()
        }
    }

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ServeConfig::from_options(options(temp.path()), 4200).unwrap();

        assert_eq!(config.scheme(), "http");
        assert!(config.tls.is_none());
        assert!(config.reload_enabled());
        assert!(config.rebuilds());
        assert_eq!(config.out_dir, config.root.join("dist"));
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.debounce_max_wait, Duration::from_millis(500));
    }

    #[test]
    fn test_ssl_without_cert_is_invalid() {
        let temp = TempDir::new().unwrap();
        let opts = ServeOptions {
            ssl: true,
            ssl_key: Some(PathBuf::from("key.pem")),
            ..options(temp.path())
        };

        let err = ServeConfig::from_options(opts, 4200).unwrap_err();
        match err {
            CliError::Serve(ServeError::InvalidTlsMaterial { reason }) => {
                assert!(reason.contains("sslCert"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ssl_with_both_files() {
        let temp = TempDir::new().unwrap();
        let opts = ServeOptions {
            ssl: true,
            ssl_key: Some(PathBuf::from("certs/key.pem")),
            ssl_cert: Some(PathBuf::from("certs/cert.pem")),
            ..options(temp.path())
        };

        let config = ServeConfig::from_options(opts, 4200).unwrap();
        let tls = config.tls.as_ref().unwrap();
        assert_eq!(tls.key, config.root.join("certs/key.pem"));
        assert_eq!(config.scheme(), "https");
    }

    #[test]
    fn test_loads_proxy_rules() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("proxy.conf.json"),
            r#"{ "/api": { "target": "http://localhost:9000" } }"#,
        )
        .unwrap();
        let opts = ServeOptions {
            proxy_config: Some(PathBuf::from("proxy.conf.json")),
            ..options(temp.path())
        };

        let config = ServeConfig::from_options(opts, 4200).unwrap();
        assert_eq!(config.proxy_rules.len(), 1);
    }

    #[test]
    fn test_missing_proxy_config() {
        let temp = TempDir::new().unwrap();
        let opts = ServeOptions {
            proxy_config: Some(PathBuf::from("nope.json")),
            ..options(temp.path())
        };
        assert!(matches!(
            ServeConfig::from_options(opts, 4200),
            Err(CliError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(ServeConfig::from_options(options(&temp.path().join("nope")), 4200).is_err());
    }

    #[test]
    fn test_invalid_live_reload_client() {
        let temp = TempDir::new().unwrap();
        let opts = ServeOptions {
            live_reload_client: Some("ftp://example.com".to_string()),
            ..options(temp.path())
        };
        assert!(ServeConfig::from_options(opts, 4200).is_err());
    }

    #[test]
    fn test_watch_target() {
        let temp = TempDir::new().unwrap();

        let with_command = ServeConfig::from_options(
            ServeOptions {
                build_command: Some("npm run build".to_string()),
                ..options(temp.path())
            },
            4200,
        )
        .unwrap();
        let target = with_command.watch_target().unwrap();
        assert_eq!(target.root, with_command.root);
        assert_eq!(target.ignored_dirs, vec![with_command.out_dir.clone()]);

        let without_command = ServeConfig::from_options(options(temp.path()), 4200).unwrap();
        assert_eq!(without_command.watch_target().unwrap().root, without_command.out_dir);

        let use_dist = ServeConfig::from_options(
            ServeOptions {
                use_dist: true,
                build_command: Some("npm run build".to_string()),
                ..options(temp.path())
            },
            4200,
        )
        .unwrap();
        assert!(use_dist.watch_target().is_none());
        assert!(!use_dist.build_policy().watch);
        assert_eq!(
            use_dist.pipeline().describe(),
            format!("existing output in {}", use_dist.out_dir.display())
        );
    }

    #[test]
    fn test_reload_disabled_only_without_hmr() {
        let temp = TempDir::new().unwrap();
        let config = ServeConfig::from_options(
            ServeOptions {
                live_reload: false,
                hmr: true,
                ..options(temp.path())
            },
            4200,
        )
        .unwrap();
        assert!(config.reload_enabled());

        let config = ServeConfig::from_options(
            ServeOptions {
                live_reload: false,
                ..options(temp.path())
            },
            4200,
        )
        .unwrap();
        assert!(!config.reload_enabled());
    }
}
