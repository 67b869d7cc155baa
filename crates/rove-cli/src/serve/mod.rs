//! Development server: builds, serves and pushes reload notifications.
//!
//! Data flow:
//!
//! ```text
//! file change -> FileWatcher -> BuildWatcher -> BuildEvent
//!     -> GenerationStore::publish -> ReloadChannel::notify
//! ```
//!
//! Requests are answered by the proxy router (first matching rule) or from
//! the current generation's manifest.

pub mod assets;
pub mod build_watcher;
pub mod config;
pub mod generation;
pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod port;
pub mod proxy;
pub mod reload;
pub mod server;
pub mod tls;
pub mod watcher;

pub use build_watcher::{BuildEvent, BuildOutcome, BuildPolicy, BuildWatcher, WatcherState};
pub use config::{ServeConfig, TlsMaterial};
pub use generation::{BuildGeneration, GenerationStore};
pub use manifest::{ChangeSet, Manifest, OutputFile};
pub use orchestrator::{ServeHandle, ServeOrchestrator, ServeState};
pub use pipeline::{BuildFailure, BuildPipeline, CommandPipeline, OutputDirPipeline};
pub use port::{negotiate, NegotiatedPort};
pub use reload::{ReloadChannel, ReloadMessage};
pub use watcher::{FileChange, FileWatcher};

use tokio::sync::watch;

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
