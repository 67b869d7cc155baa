//! HTTP(S) surface: routing, the live-reload endpoints and the accept loops.

use crate::error::ServeError;
use crate::serve::assets::{self, AssetOptions};
use crate::serve::generation::GenerationStore;
use crate::serve::proxy::ProxyRouter;
use crate::serve::reload::{ReloadChannel, SCRIPT_PATH, SOCKET_PATH};
use crate::serve::shutdown_requested;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto::Builder, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tower_http::cors::{Any, CorsLayer};

/// Shared request state.
#[derive(Clone)]
pub struct AppState {
    pub generations: Arc<GenerationStore>,
    pub proxy: Option<Arc<ProxyRouter>>,
    pub reload: Arc<ReloadChannel>,
    pub assets: Arc<AssetOptions>,
    pub scheme: &'static str,
}

/// Build the axum router.
///
/// Proxy rules are consulted before assets; the live-reload routes only
/// exist when the channel is enabled.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();

    if state.reload.is_enabled() {
        router = router
            .route(SOCKET_PATH, get(handle_socket))
            .route(SCRIPT_PATH, get(handle_script));
    }

    router
        .fallback(handle_request)
        .layer(
            // CORS: Allow all origins for dev
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_request(State(state): State<AppState>, req: Request) -> Response {
    let proxied = state
        .proxy
        .as_ref()
        .filter(|proxy| proxy.match_rule(req.uri().path()).is_some());

    if let Some(proxy) = proxied {
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        return proxy
            .route(req, remote, state.scheme)
            .await
            .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response());
    }

    // One snapshot for the whole response
    let generation = state.generations.current();
    assets::respond(
        &generation,
        req.method(),
        req.uri().path(),
        req.headers(),
        &state.assets,
    )
}

async fn handle_script(State(state): State<AppState>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        state.reload.client_script(),
    )
        .into_response()
}

async fn handle_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let channel = Arc::clone(&state.reload);
    ws.on_upgrade(move |socket| channel.serve_socket(socket))
}

/// Serve `router` on `listener` until `shutdown` flips, then drain.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    match tls {
        None => {
            let mut shutdown = shutdown;
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
            .await
            .map_err(|e| ServeError::Server(e.to_string()))
        }
        Some(acceptor) => serve_tls(listener, router, acceptor, shutdown).await,
    }
}

async fn serve_tls(
    listener: TcpListener,
    router: Router,
    acceptor: TlsAcceptor,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    let graceful = GracefulShutdown::new();
    let builder = Builder::new(TokioExecutor::new());

    let outcome = loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => match accept_error_action(&e) {
                        AcceptAction::Retry => {
                            tracing::debug!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        AcceptAction::Backoff => {
                            tracing::warn!(error = %e, "Out of file descriptors, pausing accepts");
                            tokio::select! {
                                _ = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                                _ = shutdown_requested(&mut shutdown) => break Ok(()),
                            }
                        }
                        AcceptAction::Fail => {
                            break Err(ServeError::Server(format!("accept failed: {e}")));
                        }
                    },
                };

                let acceptor = acceptor.clone();
                let builder = builder.clone();
                let app = router.clone().layer(Extension(ConnectInfo(remote)));
                let watcher = graceful.watcher();

                tokio::spawn(async move {
                    let stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!(%remote, error = %e, "TLS handshake failed");
                            return;
                        }
                    };

                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(app))
                        .into_owned();
                    if let Err(e) = watcher.watch(conn).await {
                        tracing::debug!(%remote, error = %e, "Connection error");
                    }
                });
            }
            _ = shutdown_requested(&mut shutdown) => break Ok(()),
        }
    };

    drop(listener);
    graceful.shutdown().await;
    outcome
}

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptAction {
    /// The failure belongs to one connection; keep accepting
    Retry,
    /// Process-wide resource exhaustion; pause before the next accept
    Backoff,
    /// The listener itself is broken
    Fail,
}

fn accept_error_action(error: &io::Error) -> AcceptAction {
    use io::ErrorKind::*;

    // ENFILE, EMFILE
    if matches!(error.raw_os_error(), Some(23 | 24)) || error.kind() == OutOfMemory {
        return AcceptAction::Backoff;
    }

    match error.kind() {
        ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock
        | TimedOut => AcceptAction::Retry,
        _ => AcceptAction::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_error_action() {
        let kind = |k: io::ErrorKind| accept_error_action(&io::Error::from(k));

        assert_eq!(kind(io::ErrorKind::ConnectionAborted), AcceptAction::Retry);
        assert_eq!(kind(io::ErrorKind::ConnectionReset), AcceptAction::Retry);
        assert_eq!(kind(io::ErrorKind::Interrupted), AcceptAction::Retry);

        assert_eq!(
            accept_error_action(&io::Error::from_raw_os_error(24)),
            AcceptAction::Backoff
        );
        assert_eq!(
            accept_error_action(&io::Error::from_raw_os_error(23)),
            AcceptAction::Backoff
        );
        assert_eq!(kind(io::ErrorKind::OutOfMemory), AcceptAction::Backoff);

        assert_eq!(kind(io::ErrorKind::InvalidInput), AcceptAction::Fail);
        assert_eq!(kind(io::ErrorKind::PermissionDenied), AcceptAction::Fail);
    }
}
