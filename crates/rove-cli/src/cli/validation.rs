/// Validate a `--host` value.
///
/// Accepts host names and IP addresses; rejects anything carrying a scheme,
/// port or path, which belong in other flags.
pub fn parse_host(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    if s.contains("://") || s.contains('/') {
        return Err(format!(
            "Host must be a bare host name or IP address, not a URL: '{}'",
            s
        ));
    }

    if s.parse::<std::net::IpAddr>().is_err() && s.contains(':') {
        return Err(format!("Host must not include a port (use --port): '{}'", s));
    }

    Ok(s.to_string())
}

/// Validate a `--live-reload-client` URL.
///
/// The browser client opens a WebSocket to this URL, so `ws`/`wss` are taken
/// as-is and `http`/`https` are accepted for convenience.
pub fn parse_client_url(s: &str) -> Result<String, String> {
    let url = reqwest::Url::parse(s).map_err(|e| format!("Invalid URL '{}': {}", s, e))?;

    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(s.to_string()),
        other => Err(format!(
            "Live-reload client URL must use ws, wss, http or https (got '{}')",
            other
        )),
    }
}
