//! Proxy configuration file parsing.
//!
//! Two layouts are accepted, both preserving declaration order:
//!
//! ```json
//! [
//!   { "path": "/api", "target": "http://localhost:9000" },
//!   { "context": ["/auth", "/login"], "target": "https://localhost:9443", "secure": false }
//! ]
//! ```
//!
//! ```json
//! {
//!   "/api": { "target": "http://localhost:9000", "pathRewrite": { "^/api": "" } }
//! }
//! ```

use crate::error::{ConfigError, Result, ResultExt};
use indexmap::IndexMap;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;

/// One forwarding rule. Rules are evaluated in order; the first match wins.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    /// Pattern as written in the config file
    pub pattern: String,
    /// Normalized path prefix (no trailing slash, empty for "/")
    pub prefix: String,
    /// Upstream base URL
    pub target: Url,
    /// Regex rewrites applied to the full request path, in order
    pub path_rewrite: Vec<PathRewrite>,
    /// Rewrite the Host header to the upstream authority
    pub change_origin: bool,
    /// Verify upstream TLS certificates
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct PathRewrite {
    pub pattern: Regex,
    pub replacement: String,
}

impl ProxyRule {
    /// Build a rule from a path pattern and an upstream URL.
    pub fn new(pattern: &str, target: &str) -> std::result::Result<Self, String> {
        let prefix = normalize_pattern(pattern)?;
        let target = Url::parse(target).map_err(|e| format!("invalid target '{}': {}", target, e))?;

        if !matches!(target.scheme(), "http" | "https") || target.host_str().is_none() {
            return Err(format!(
                "target '{}' must be an absolute http(s) URL",
                target
            ));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            prefix,
            target,
            path_rewrite: Vec::new(),
            change_origin: true,
            secure: true,
        })
    }

    /// Whether `path` falls under this rule. Prefixes match on segment
    /// boundaries: `/api` matches `/api` and `/api/users` but not `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Compute the upstream URL for a matching request path.
    ///
    /// Without rewrites the matched prefix is replaced by the target's path;
    /// with rewrites the rewritten full path is appended to the target's path.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let forwarded = if self.path_rewrite.is_empty() {
            path.strip_prefix(self.prefix.as_str())
                .unwrap_or(path)
                .to_string()
        } else {
            self.path_rewrite.iter().fold(path.to_string(), |acc, rewrite| {
                rewrite
                    .pattern
                    .replace(&acc, rewrite.replacement.as_str())
                    .into_owned()
            })
        };

        let base = self.target.path().trim_end_matches('/');
        let mut joined = String::with_capacity(base.len() + forwarded.len() + 1);
        joined.push_str(base);
        if !forwarded.is_empty() && !forwarded.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(&forwarded);
        if joined.is_empty() {
            joined.push('/');
        }

        let mut url = self.target.clone();
        url.set_path(&joined);
        url.set_query(query);
        url
    }
}

/// Strip glob suffixes and trailing slashes: `/api/**` -> `/api`, `/` -> ``.
fn normalize_pattern(pattern: &str) -> std::result::Result<String, String> {
    if !pattern.starts_with('/') {
        return Err(format!("path pattern '{}' must start with '/'", pattern));
    }

    let trimmed = pattern
        .strip_suffix("/**")
        .or_else(|| pattern.strip_suffix("/*"))
        .unwrap_or(pattern);

    Ok(trimmed.trim_end_matches('/').to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProxyConfig {
    List(Vec<RawListRule>),
    Map(IndexMap<String, RawTarget>),
}

#[derive(Deserialize)]
struct RawListRule {
    #[serde(alias = "context")]
    path: OneOrMany,
    #[serde(flatten)]
    target: RawTarget,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTarget {
    target: String,
    #[serde(default)]
    path_rewrite: IndexMap<String, String>,
    #[serde(default = "crate::config::default_true")]
    change_origin: bool,
    #[serde(default = "crate::config::default_true")]
    secure: bool,
}

/// Parse proxy rules from JSON text. `path` is only used in error messages.
pub fn parse_proxy_config(content: &str, path: &Path) -> Result<Vec<ProxyRule>> {
    let invalid = |reason: String| ConfigError::InvalidProxyConfig {
        path: path.to_path_buf(),
        reason,
    };

    let raw: RawProxyConfig =
        serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;

    let entries: Vec<(String, RawTarget)> = match raw {
        RawProxyConfig::Map(map) => map.into_iter().collect(),
        RawProxyConfig::List(list) => {
            let mut entries = Vec::new();
            for rule in list {
                match rule.path {
                    OneOrMany::One(p) => entries.push((p, rule.target)),
                    OneOrMany::Many(paths) => {
                        for p in paths {
                            entries.push((
                                p,
                                RawTarget {
                                    target: rule.target.target.clone(),
                                    path_rewrite: rule.target.path_rewrite.clone(),
                                    change_origin: rule.target.change_origin,
                                    secure: rule.target.secure,
                                },
                            ));
                        }
                    }
                }
            }
            entries
        }
    };

    let mut rules = Vec::with_capacity(entries.len());
    for (pattern, raw_target) in entries {
        let mut rule = ProxyRule::new(&pattern, &raw_target.target).map_err(&invalid)?;
        rule.change_origin = raw_target.change_origin;
        rule.secure = raw_target.secure;

        for (from, to) in raw_target.path_rewrite {
            let regex = Regex::new(&from)
                .map_err(|e| invalid(format!("invalid pathRewrite '{}': {}", from, e)))?;
            rule.path_rewrite.push(PathRewrite {
                pattern: regex,
                replacement: to,
            });
        }

        rules.push(rule);
    }

    Ok(rules)
}

/// Read and parse a proxy configuration file.
pub fn load_proxy_config(path: &Path) -> Result<Vec<ProxyRule>> {
    let content = std::fs::read_to_string(path).with_path(path)?;
    parse_proxy_config(&content, path)
}
