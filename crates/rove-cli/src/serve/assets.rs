//! Static asset responses served from the current build generation.
//!
//! Everything here is a pure function of (generation, request), which keeps
//! responses byte-identical for identical requests against a stable
//! generation.

use crate::serve::generation::BuildGeneration;
use crate::serve::manifest::OutputFile;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode},
};
use percent_encoding::percent_decode_str;

/// Response header carrying the generation id a response was served from.
pub const GENERATION_HEADER: HeaderName = HeaderName::from_static("x-rove-generation");

/// How assets are resolved and decorated.
#[derive(Debug, Clone, Default)]
pub struct AssetOptions {
    /// Serve `/index.html` for unmatched extension-less paths
    pub spa_fallback: bool,
    /// Script URL injected into HTML responses; `None` disables injection
    pub reload_script: Option<String>,
}

/// Build the response for `path` against `generation`.
pub fn respond(
    generation: &BuildGeneration,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    options: &AssetOptions,
) -> Response<Body> {
    if method != Method::GET && method != Method::HEAD {
        let mut res = plain(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        res.headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return res;
    }

    if !generation.is_ready() {
        let mut res = plain(StatusCode::SERVICE_UNAVAILABLE, "Build in progress, retrying shortly");
        res.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        return res;
    }

    // Manifest keys are decoded file names
    let Ok(decoded) = percent_decode_str(path).decode_utf8() else {
        return plain(StatusCode::BAD_REQUEST, "Request path is not valid UTF-8");
    };
    let path = decoded.as_ref();

    let Some((served_path, file)) = resolve(generation, path, headers, options) else {
        return plain(StatusCode::NOT_FOUND, &format!("File not found: {}", path));
    };

    let (body, etag) = match &options.reload_script {
        Some(src) if file.content_type.starts_with("text/html") => (
            axum::body::Bytes::from(inject_reload_script(&file.bytes, src)),
            format!("\"{}-lr\"", file.etag),
        ),
        _ => (file.bytes.clone(), format!("\"{}\"", file.etag)),
    };

    tracing::trace!(path, served = served_path, generation = generation.id, "Serving asset");

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| etag_matches(v, &etag));

    let builder = Response::builder()
        .header(header::ETAG, &etag)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(GENERATION_HEADER, generation.id);

    let result = if not_modified {
        builder.status(StatusCode::NOT_MODIFIED).body(Body::empty())
    } else {
        let builder = builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, file.content_type)
            .header(header::CONTENT_LENGTH, body.len());
        if method == Method::HEAD {
            builder.body(Body::empty())
        } else {
            builder.body(Body::from(body))
        }
    };

    result.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build asset response");
        plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })
}

/// Map a request path to a manifest entry.
fn resolve<'g>(
    generation: &'g BuildGeneration,
    path: &str,
    headers: &HeaderMap,
    options: &AssetOptions,
) -> Option<(String, &'g OutputFile)> {
    let manifest = &generation.manifest;

    let candidates = if path.ends_with('/') {
        vec![format!("{}index.html", path)]
    } else {
        vec![path.to_string(), format!("{}/index.html", path)]
    };

    for candidate in candidates {
        if let Some(file) = manifest.get(&candidate) {
            return Some((candidate, file));
        }
    }

    if options.spa_fallback && !has_extension(path) && accepts_html(headers) {
        return manifest
            .get("/index.html")
            .map(|file| ("/index.html".to_string(), file));
    }

    None
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}

/// True unless `Accept` is present and rules out HTML.
fn accepts_html(headers: &HeaderMap) -> bool {
    match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(accept) => accept
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim())
            .any(|mime| matches!(mime, "text/html" | "text/*" | "*/*")),
    }
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// Inject the reload client before the closing `</body>` tag.
///
/// Documents without `</body>` get the tag appended.
pub fn inject_reload_script(content: &[u8], script_src: &str) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script src="{}"></script>"#, script_src);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(&script_tag);
    result.into_bytes()
}

fn plain(status: StatusCode, message: &str) -> Response<Body> {
    let mut res = Response::new(Body::from(message.to_string()));
    *res.status_mut() = status;
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    res
}
