//! Serve lifecycle: start everything, route build events, shut down cleanly.
//!
//! `Starting → Running → Stopping → Stopped`, or `Starting → Failed` when
//! TLS material, the port or the bind is unusable. Nothing is bound before
//! the configuration and TLS material have been validated.

use crate::error::{Result, ResultExt, ServeError};
use crate::serve::assets::AssetOptions;
use crate::serve::build_watcher::{BuildEvent, BuildOutcome, BuildWatcher, BuildWatcherHandle};
use crate::serve::config::ServeConfig;
use crate::serve::generation::GenerationStore;
use crate::serve::pipeline::BuildPipeline;
use crate::serve::port::{self, NegotiatedPort};
use crate::serve::proxy::ProxyRouter;
use crate::serve::reload::{ReloadChannel, ReloadSettings, SCRIPT_PATH};
use crate::serve::server::{self, AppState};
use crate::serve::tls;
use crate::serve::watcher::{FileChange, FileWatcher};
use crate::ui;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How long in-flight requests get to finish once stopping.
const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Builds and starts a serve session.
pub struct ServeOrchestrator {
    config: ServeConfig,
    pipeline: Option<Arc<dyn BuildPipeline>>,
    changes: Option<mpsc::Receiver<FileChange>>,
}

impl ServeOrchestrator {
    pub fn new(config: ServeConfig) -> Self {
        Self {
            config,
            pipeline: None,
            changes: None,
        }
    }

    /// Use `pipeline` instead of the one derived from the config.
    pub fn with_pipeline(mut self, pipeline: Arc<dyn BuildPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Feed changes from `changes` instead of watching the file system.
    pub fn with_changes(mut self, changes: mpsc::Receiver<FileChange>) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Run the `Starting` phase and hand back a handle to the running server.
    pub async fn start(self) -> Result<ServeHandle> {
        let (state_tx, state_rx) = watch::channel(ServeState::Starting);
        tracing::debug!(state = ?ServeState::Starting, "Serve state");

        match self.start_inner(state_tx, state_rx).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::debug!(state = ?ServeState::Failed, error = %e, "Serve state");
                Err(e)
            }
        }
    }

    async fn start_inner(
        self,
        state_tx: watch::Sender<ServeState>,
        state_rx: watch::Receiver<ServeState>,
    ) -> Result<ServeHandle> {
        let config = self.config;

        let acceptor = match &config.tls {
            Some(material) => Some(tls::make_tls_acceptor(&material.key, &material.cert)?),
            None => None,
        };

        let proxy = if config.proxy_rules.is_empty() {
            None
        } else {
            Some(Arc::new(ProxyRouter::new(
                config.proxy_rules.clone(),
                config.proxy_timeout,
            )?))
        };

        let negotiated = port::negotiate(
            config.port,
            &config.host,
            config.default_port,
            config.port_scan_attempts,
        )?;
        if negotiated.substituted() {
            ui::warning(&format!(
                "Port {} is busy, using port {} instead",
                negotiated.requested, negotiated.actual
            ));
        }

        let ip = port::resolve_host(&config.host)?;
        let addr = SocketAddr::new(ip, negotiated.actual);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServeError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;

        // Source of file changes: injected, watched, or none at all. Created after
        // the bind; a failed start must not touch the disk.
        let mut file_watcher = None;
        let changes = match self.changes {
            Some(changes) => changes,
            None => match config.watch_target() {
                Some(target) => {
                    if !target.root.exists() {
                        std::fs::create_dir_all(&target.root)
                            .context(format!("Failed to create {}", target.root.display()))?;
                    }
                    let (watcher, rx) = FileWatcher::new(
                        target.root,
                        config.watch_ignore.clone(),
                        target.ignored_dirs,
                    )?;
                    tracing::debug!(root = %watcher.root().display(), "Watching for changes");
                    file_watcher = Some(watcher);
                    rx
                }
                None => mpsc::channel(1).1,
            },
        };

        let reload = Arc::new(ReloadChannel::new(ReloadSettings {
            enabled: config.reload_enabled(),
            hmr: config.hmr,
            send_timeout: config.client_send_timeout,
            client_url: config.live_reload_client.clone(),
        }));

        let generations = Arc::new(GenerationStore::new());

        let app = server::build_router(AppState {
            generations: Arc::clone(&generations),
            proxy,
            reload: Arc::clone(&reload),
            assets: Arc::new(AssetOptions {
                spa_fallback: config.spa_fallback,
                reload_script: config.reload_enabled().then(|| SCRIPT_PATH.to_string()),
            }),
            scheme: config.scheme(),
        });

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(server::serve(listener, app, acceptor, server_shutdown_rx));

        let pipeline = self.pipeline.unwrap_or_else(|| config.pipeline());
        tracing::debug!(pipeline = %pipeline.describe(), "Starting build watcher");
        let (build_handle, events) = BuildWatcher::spawn(pipeline, changes, config.build_policy());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Session {
            generations: Arc::clone(&generations),
            reload: Arc::clone(&reload),
            state: state_tx,
        };
        let task = tokio::spawn(session.run(
            events,
            build_handle,
            file_watcher,
            server_task,
            server_shutdown_tx,
            shutdown_rx,
        ));

        let display_host = match config.host.as_str() {
            "0.0.0.0" | "::" => "localhost".to_string(),
            host if host.contains(':') => format!("[{}]", host),
            host => host.to_string(),
        };

        Ok(ServeHandle {
            url: format!("{}://{}:{}", config.scheme(), display_host, local_addr.port()),
            local_addr,
            negotiated,
            generations,
            reload,
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// The `Running` and `Stopping` phases.
struct Session {
    generations: Arc<GenerationStore>,
    reload: Arc<ReloadChannel>,
    state: watch::Sender<ServeState>,
}

impl Session {
    fn transition(&self, state: ServeState) {
        tracing::debug!(?state, "Serve state");
        self.state.send_replace(state);
    }

    async fn run(
        self,
        mut events: mpsc::Receiver<BuildEvent>,
        build_handle: BuildWatcherHandle,
        file_watcher: Option<FileWatcher>,
        mut server_task: JoinHandle<std::result::Result<(), ServeError>>,
        server_shutdown: watch::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.transition(ServeState::Running);

        let mut events_open = true;
        let outcome: Result<()> = loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_build_event(event),
                    None => events_open = false,
                },
                result = &mut server_task => {
                    break match result {
                        Ok(Ok(())) => Err(ServeError::Server("server stopped unexpectedly".to_string()).into()),
                        Ok(Err(e)) => Err(e.into()),
                        Err(e) => Err(ServeError::Server(e.to_string()).into()),
                    };
                }
                _ = crate::serve::shutdown_requested(&mut shutdown) => break Ok(()),
            }
        };

        self.transition(ServeState::Stopping);

        drop(file_watcher);
        build_handle.stop().await;
        self.reload.close_all("server stopped");

        if !server_task.is_finished() {
            let _ = server_shutdown.send(true);
            match tokio::time::timeout(GRACEFUL_SHUTDOWN, &mut server_task).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!("Graceful shutdown timed out, closing remaining connections");
                    server_task.abort();
                }
            }
        }

        self.transition(ServeState::Stopped);
        outcome
    }

    /// Publish (successes only), then notify clients.
    fn on_build_event(&self, event: BuildEvent) {
        match &event.outcome {
            BuildOutcome::Succeeded {
                manifest, changes, ..
            } => {
                let published = self
                    .generations
                    .publish(event.generation, Arc::clone(manifest));
                if !published {
                    return;
                }
                ui::success(&format!(
                    "Build {} completed in {} ({} files, {}, {} changed)",
                    event.generation,
                    ui::format_duration(Duration::from_millis(event.duration_ms)),
                    manifest.len(),
                    ui::format_size(manifest.total_size()),
                    changes.len()
                ));
            }
            BuildOutcome::Failed { error } => {
                ui::error(&format!(
                    "Build {} failed, still serving generation {}\n{}",
                    event.generation,
                    self.generations.current_id(),
                    ServeError::BuildFailed(error.clone())
                ));
            }
        }

        let notified = self.reload.notify(&event);
        tracing::debug!(generation = event.generation, clients = notified, "Notified clients");
    }
}

/// Handle to a running serve session.
pub struct ServeHandle {
    local_addr: SocketAddr,
    url: String,
    negotiated: NegotiatedPort,
    generations: Arc<GenerationStore>,
    reload: Arc<ReloadChannel>,
    state: watch::Receiver<ServeState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ServeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL to show the user and open in a browser.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn negotiated(&self) -> NegotiatedPort {
        self.negotiated
    }

    pub fn generations(&self) -> Arc<GenerationStore> {
        Arc::clone(&self.generations)
    }

    pub fn reload(&self) -> Arc<ReloadChannel> {
        Arc::clone(&self.reload)
    }

    pub fn state(&self) -> ServeState {
        *self.state.borrow()
    }

    /// Wait until generation `id` (or a later one) is being served.
    pub async fn wait_for_generation(&self, id: u64) {
        while self.generations.current_id() < id {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Resolves when the session stops on its own (fatal server error).
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ServeState::Stopped).await;
    }

    /// Stop serving and return the session's final result.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServeError::Server(e.to_string()).into()),
        }
    }
}
