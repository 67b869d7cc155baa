//! Forwarding of matched request paths to upstream services.

use crate::config::ProxyRule;
use crate::error::{ProxyUpstreamError, Result, ServeError};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode},
};
use std::net::SocketAddr;
use std::time::Duration;

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Ordered proxy rules plus the HTTP clients that serve them.
pub struct ProxyRouter {
    rules: Vec<ProxyRule>,
    client: reqwest::Client,
    /// Used by rules with `secure: false`
    insecure_client: reqwest::Client,
    timeout: Duration,
}

impl ProxyRouter {
    pub fn new(rules: Vec<ProxyRule>, timeout: Duration) -> Result<Self> {
        let build = |accept_invalid: bool| {
            reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .connect_timeout(timeout)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| ServeError::Server(format!("Failed to create proxy client: {}", e)))
        };

        Ok(Self {
            rules,
            client: build(false)?,
            insecure_client: build(true)?,
            timeout,
        })
    }

    /// First rule whose pattern matches `path`.
    pub fn match_rule(&self, path: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// Forward `req` if a rule matches; `None` means the request is not
    /// proxied. Upstream failures become 502/504 responses.
    pub async fn route(
        &self,
        req: Request<Body>,
        remote: Option<SocketAddr>,
        scheme: &str,
    ) -> Option<Response<Body>> {
        let rule = self.match_rule(req.uri().path())?;

        let response = match self.forward(rule, req, remote, scheme).await {
            Ok(response) => response,
            Err(e) => {
                let response = upstream_error(&e);
                tracing::warn!(error = %ServeError::from(e), "Proxy request failed");
                response
            }
        };

        Some(response)
    }

    /// Forward one request to the upstream of `rule`, streaming both bodies.
    pub async fn forward(
        &self,
        rule: &ProxyRule,
        req: Request<Body>,
        remote: Option<SocketAddr>,
        scheme: &str,
    ) -> std::result::Result<Response<Body>, ProxyUpstreamError> {
        let (parts, body) = req.into_parts();
        let url = rule.upstream_url(parts.uri.path(), parts.uri.query());
        let target = url.to_string();

        tracing::debug!(method = %parts.method, path = %parts.uri.path(), upstream = %target, "Proxying");

        let original_host = parts.headers.get(header::HOST).cloned();
        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        if !rule.change_origin {
            if let Some(host) = &original_host {
                headers.insert(header::HOST, host.clone());
            }
        }
        add_forwarded_headers(&mut headers, remote, original_host.as_ref(), scheme);

        if let Some(length) = parts.headers.get(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, length.clone());
        }

        let client = if rule.secure {
            &self.client
        } else {
            &self.insecure_client
        };

        let request = client
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()));

        let upstream = match tokio::time::timeout(self.timeout, request.send()).await {
            Err(_) => {
                return Err(ProxyUpstreamError::Timeout {
                    target,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Err(ProxyUpstreamError::Timeout {
                    target,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) if e.is_connect() => {
                return Err(ProxyUpstreamError::Connect {
                    target,
                    reason: e.to_string(),
                })
            }
            Ok(Err(e)) => {
                return Err(ProxyUpstreamError::Request {
                    target,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(upstream)) => upstream,
        };

        let status = upstream.status();
        let response_headers = strip_hop_by_hop(upstream.headers());

        let mut response = Response::builder()
            .status(status)
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ProxyUpstreamError::Request {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        *response.headers_mut() = response_headers;

        Ok(response)
    }
}

/// Copy `headers` without hop-by-hop headers, including any listed in
/// `Connection`.
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || listed.iter().any(|l| l == name_str) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn add_forwarded_headers(
    headers: &mut HeaderMap,
    remote: Option<SocketAddr>,
    original_host: Option<&HeaderValue>,
    scheme: &str,
) {
    const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
    const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
    const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

    if let Some(addr) = remote {
        let ip = addr.ip().to_string();
        let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }

    if let Ok(proto) = HeaderValue::from_str(scheme) {
        headers.insert(X_FORWARDED_PROTO, proto);
    }
}

fn upstream_error(error: &ProxyUpstreamError) -> Response<Body> {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut res = Response::new(Body::from(error.to_string()));
    *res.status_mut() = status;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res
}
