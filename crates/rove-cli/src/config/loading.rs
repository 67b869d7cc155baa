use crate::cli::ServeArgs;
use crate::config::{ResolvedOptions, ServeOptions, CONFIG_FILE_NAME};
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use std::path::{Path, PathBuf};

/// Key the serve options live under, both in `rove.config.json` and in the
/// merged figment.
const SERVE_KEY: &str = "serve";

impl ServeOptions {
    /// Load options from every source.
    ///
    /// Priority: CLI args > `PORT` > `ROVE_*` environment > config file > defaults.
    /// The port resolved *before* CLI args is reported as the default port.
    pub fn load(args: &ServeArgs) -> Result<ResolvedOptions> {
        let root = args.build.root.clone().unwrap_or_else(|| PathBuf::from("."));
        let base = Self::load_layers(&root, args.build.config.as_deref())?;

        let default_port = base.port;
        let mut options = base;
        args.apply_to(&mut options);

        Ok(ResolvedOptions {
            options,
            default_port,
        })
    }

    /// Merge defaults, config file and environment, without CLI flags.
    pub fn load_layers(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::default(SERVE_KEY, Self::default()));

        let config_file = match config_path {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    root.join(path)
                };
                if !path.exists() {
                    return Err(ConfigError::NotFound(path).into());
                }
                Some(path)
            }
            None => {
                let default_path = root.join(CONFIG_FILE_NAME);
                default_path.exists().then_some(default_path)
            }
        };

        if let Some(path) = config_file {
            tracing::debug!(path = %path.display(), "Loading config file");
            figment = figment.merge(Json::file(path));
        }

        // ROVE_SSL_KEY -> serve.sslKey
        figment = figment.merge(
            Env::prefixed("ROVE_")
                .map(|key| format!("{}.{}", SERVE_KEY, env_key_to_field(key.as_str())).into())
                .lowercase(false),
        );

        // The conventional PORT variable wins over everything but the CLI.
        figment = figment.merge(
            Env::raw()
                .only(&["PORT"])
                .map(|_| format!("{}.port", SERVE_KEY).into())
                .lowercase(false),
        );

        let mut options: Self = figment.extract_inner(SERVE_KEY).map_err(|e| {
            crate::error::CliError::from(ConfigError::InvalidValue {
                field: "configuration".to_string(),
                value: e.to_string(),
                hint: format!("Check the \"serve\" section of {} and ROVE_* variables", CONFIG_FILE_NAME),
            })
        })?;

        if options.root == PathBuf::from(".") {
            options.root = root.to_path_buf();
        }

        Ok(options)
    }
}

/// Convert an environment variable suffix (`SSL_KEY`) to its field name (`sslKey`).
pub(crate) fn env_key_to_field(key: &str) -> String {
    let mut field = String::with_capacity(key.len());
    let mut upper_next = false;

    for c in key.chars() {
        if c == '_' {
            upper_next = !field.is_empty();
        } else if upper_next {
            field.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            field.push(c.to_ascii_lowercase());
        }
    }

    field
}
