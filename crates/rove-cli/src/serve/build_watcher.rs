//! Build scheduling: turns file changes into a serial stream of build events.
//!
//! One task owns the pipeline. Changes that arrive while a build runs are
//! collected and merged into a single follow-up build, and every build waits
//! for a quiet debounce window first. A steady stream of changes cannot hold
//! a build back longer than the policy's max wait. Builds never overlap.

use crate::serve::manifest::{ChangeSet, Manifest};
use crate::serve::pipeline::BuildPipeline;
use crate::serve::shutdown_requested;
use crate::serve::watcher::FileChange;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_QUEUE: usize = 16;

/// Observable state of the build watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Building,
    /// Single build done and watching is off; no further builds happen.
    Disabled,
    Stopped,
}

/// Scheduling policy.
#[derive(Debug, Clone)]
pub struct BuildPolicy {
    pub debounce: Duration,
    /// Upper bound on the debounce phase once changes are pending
    pub max_wait: Duration,
    /// When false, one build (or reuse of existing output) runs and the
    /// watcher moves to [`WatcherState::Disabled`].
    pub watch: bool,
    /// Output files that always force a full reload.
    pub structural_files: Vec<String>,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(crate::config::default_debounce_ms()),
            max_wait: Duration::from_millis(crate::config::default_debounce_max_wait_ms()),
            watch: true,
            structural_files: crate::config::default_structural_files(),
        }
    }
}

/// Result of one build attempt.
#[derive(Debug, Clone)]
pub struct BuildEvent {
    /// Attempt id; strictly increasing, failures included
    pub generation: u64,
    pub outcome: BuildOutcome,
    pub duration_ms: u64,
    /// Source paths whose change triggered this build (empty for the first)
    pub source_changes: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Succeeded {
        manifest: Arc<Manifest>,
        /// Diff against the last successful manifest
        changes: ChangeSet,
        hmr_eligible: bool,
    },
    Failed {
        error: String,
    },
}

impl BuildEvent {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Succeeded { .. })
    }
}

/// Decide whether a change set can be applied without a full reload.
///
/// Eligible when something changed, nothing was removed, nothing structural
/// (HTML or a configured file) changed and every changed file is a JS or CSS
/// module. Source maps are not counted.
pub fn hmr_eligible(changes: &ChangeSet, structural_files: &[String]) -> bool {
    let relevant = |path: &&str| !path.ends_with(".map");

    if changes.removed.iter().map(String::as_str).any(|p| relevant(&p)) {
        return false;
    }

    let mut updated = changes.updated().filter(relevant).peekable();
    if updated.peek().is_none() {
        return false;
    }

    updated.all(|path| {
        let structural = structural_files
            .iter()
            .any(|s| s.trim_start_matches('/') == path.trim_start_matches('/'));
        let ext = Path::new(path).extension().and_then(|e| e.to_str());
        !structural && matches!(ext, Some("js" | "mjs" | "css"))
    })
}

/// Handle to a running build watcher.
pub struct BuildWatcherHandle {
    state: watch::Receiver<WatcherState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BuildWatcherHandle {
    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.clone()
    }

    /// Stop the watcher; an in-flight build is abandoned and never reported.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Build watcher task ended abnormally");
        }
    }
}

pub struct BuildWatcher {
    pipeline: Arc<dyn BuildPipeline>,
    changes: mpsc::Receiver<FileChange>,
    changes_open: bool,
    policy: BuildPolicy,
    events: mpsc::Sender<BuildEvent>,
    state: watch::Sender<WatcherState>,
    shutdown: watch::Receiver<bool>,
    next_generation: u64,
    last_good: Arc<Manifest>,
    pending: BTreeSet<PathBuf>,
}

impl BuildWatcher {
    /// Start the watcher task; the first build begins immediately.
    pub fn spawn(
        pipeline: Arc<dyn BuildPipeline>,
        changes: mpsc::Receiver<FileChange>,
        policy: BuildPolicy,
    ) -> (BuildWatcherHandle, mpsc::Receiver<BuildEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (state_tx, state_rx) = watch::channel(WatcherState::Idle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher = BuildWatcher {
            pipeline,
            changes,
            changes_open: true,
            policy,
            events: events_tx,
            state: state_tx,
            shutdown: shutdown_rx,
            next_generation: 1,
            last_good: Arc::new(Manifest::new()),
            pending: BTreeSet::new(),
        };

        let task = tokio::spawn(watcher.run());

        (
            BuildWatcherHandle {
                state: state_rx,
                shutdown: shutdown_tx,
                task,
            },
            events_rx,
        )
    }

    async fn run(mut self) {
        loop {
            let Some(event) = self.build().await else {
                break;
            };

            if self.events.send(event).await.is_err() {
                tracing::debug!("Build event receiver dropped, stopping build watcher");
                break;
            }

            if !self.policy.watch {
                self.state.send_replace(WatcherState::Disabled);
                return;
            }

            self.state.send_replace(WatcherState::Idle);

            if !self.wait_for_changes().await {
                break;
            }
        }

        self.state.send_replace(WatcherState::Stopped);
    }

    /// Run one build, collecting changes that arrive meanwhile.
    ///
    /// Returns `None` if shutdown was requested; the build future is dropped.
    async fn build(&mut self) -> Option<BuildEvent> {
        self.state.send_replace(WatcherState::Building);

        let generation = self.next_generation;
        self.next_generation += 1;
        let source_changes: Vec<PathBuf> = std::mem::take(&mut self.pending).into_iter().collect();

        if !source_changes.is_empty() {
            tracing::debug!(generation, files = source_changes.len(), "Rebuilding");
        }

        let started = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        let build = pipeline.run_once();
        tokio::pin!(build);

        let result = loop {
            tokio::select! {
                result = &mut build => break result,
                change = self.changes.recv(), if self.changes_open => {
                    self.record(change);
                }
                _ = shutdown_requested(&mut self.shutdown) => {
                    tracing::debug!(generation, "Abandoning in-flight build");
                    return None;
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                let changes = manifest.diff(&self.last_good);
                let hmr_eligible = hmr_eligible(&changes, &self.policy.structural_files);
                self.last_good = Arc::clone(&manifest);
                BuildOutcome::Succeeded {
                    manifest,
                    changes,
                    hmr_eligible,
                }
            }
            Err(failure) => BuildOutcome::Failed {
                error: failure.message,
            },
        };

        Some(BuildEvent {
            generation,
            outcome,
            duration_ms,
            source_changes,
        })
    }

    /// Wait until there is something to build and the debounce window is
    /// quiet. Returns false on shutdown.
    async fn wait_for_changes(&mut self) -> bool {
        while self.pending.is_empty() {
            if !self.changes_open {
                shutdown_requested(&mut self.shutdown).await;
                return false;
            }
            tokio::select! {
                change = self.changes.recv() => self.record(change),
                _ = shutdown_requested(&mut self.shutdown) => return false,
            }
        }

        let deadline = tokio::time::Instant::now() + self.policy.max_wait;
        loop {
            let quiet_until = (tokio::time::Instant::now() + self.policy.debounce).min(deadline);
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return false,
                change = self.changes.recv(), if self.changes_open => self.record(change),
                _ = tokio::time::sleep_until(quiet_until) => return true,
            }
        }
    }

    fn record(&mut self, change: Option<FileChange>) {
        match change {
            Some(change) => {
                self.pending.insert(change.path().to_path_buf());
            }
            None => {
                tracing::debug!("File change channel closed");
                self.changes_open = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::pipeline::BuildFailure;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pipeline returning scripted results, optionally slowed down.
    struct Scripted {
        results: Mutex<VecDeque<Result<Manifest, BuildFailure>>>,
        delay: Duration,
        runs: AtomicUsize,
    }

    impl Scripted {
        fn new(results: Vec<Result<Manifest, BuildFailure>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                delay,
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BuildPipeline for Scripted {
        async fn run_once(&self) -> Result<Manifest, BuildFailure> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(BuildFailure::new("no more scripted results")))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn manifest(files: &[(&str, &str)]) -> Manifest {
        let mut m = Manifest::new();
        for (path, body) in files {
            m.insert(*path, body.to_string());
        }
        m
    }

    fn policy() -> BuildPolicy {
        BuildPolicy {
            debounce: Duration::from_millis(20),
            ..BuildPolicy::default()
        }
    }

    fn change(path: &str) -> FileChange {
        FileChange::Modified(PathBuf::from(path))
    }

    fn set(added: &[&str], modified: &[&str], removed: &[&str]) -> ChangeSet {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        ChangeSet {
            added: owned(added),
            modified: owned(modified),
            removed: owned(removed),
        }
    }

    #[test]
    fn test_hmr_eligibility() {
        let structural = vec!["index.html".to_string()];

        assert!(hmr_eligible(&set(&[], &["/app.js"], &[]), &structural));
        assert!(hmr_eligible(&set(&["/chunk.mjs"], &["/style.css", "/app.js.map"], &[]), &structural));

        assert!(!hmr_eligible(&set(&[], &[], &[]), &structural));
        assert!(!hmr_eligible(&set(&[], &["/app.js.map"], &[]), &structural));
        assert!(!hmr_eligible(&set(&[], &["/app.js"], &["/old.js"]), &structural));
        assert!(!hmr_eligible(&set(&[], &["/app.js", "/about.html"], &[]), &structural));
        assert!(!hmr_eligible(&set(&[], &["/logo.png"], &[]), &structural));

        let structural = vec!["/main.js".to_string()];
        assert!(!hmr_eligible(&set(&[], &["/main.js"], &[]), &structural));
    }

    #[tokio::test]
    async fn test_initial_build_reports_everything_added() {
        let pipeline = Scripted::new(
            vec![Ok(manifest(&[("/index.html", "a"), ("/app.js", "a")]))],
            Duration::ZERO,
        );
        let (_tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(pipeline, rx, policy());

        let event = events.recv().await.unwrap();
        assert_eq!(event.generation, 1);
        match event.outcome {
            BuildOutcome::Succeeded {
                changes,
                hmr_eligible,
                ..
            } => {
                assert_eq!(changes.added.len(), 2);
                assert!(!hmr_eligible);
            }
            BuildOutcome::Failed { error } => panic!("unexpected failure: {error}"),
        }

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_burst_of_changes_is_one_rebuild() {
        let pipeline = Scripted::new(
            vec![
                Ok(manifest(&[("/app.js", "a")])),
                Ok(manifest(&[("/app.js", "b")])),
            ],
            Duration::ZERO,
        );
        let (tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(pipeline.clone(), rx, policy());

        events.recv().await.unwrap();
        for i in 0..5 {
            tx.send(change(&format!("/src/file{i}.ts"))).await.unwrap();
        }

        let event = events.recv().await.unwrap();
        assert_eq!(event.generation, 2);
        assert_eq!(event.source_changes.len(), 5);
        assert!(matches!(
            event.outcome,
            BuildOutcome::Succeeded { hmr_eligible: true, .. }
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_steady_changes_still_rebuild_after_max_wait() {
        let pipeline = Scripted::new(
            vec![
                Ok(manifest(&[("/app.js", "a")])),
                Ok(manifest(&[("/app.js", "b")])),
                Ok(manifest(&[("/app.js", "c")])),
            ],
            Duration::ZERO,
        );
        let (tx, rx) = mpsc::channel(64);
        let (handle, mut events) = BuildWatcher::spawn(
            pipeline,
            rx,
            BuildPolicy {
                debounce: Duration::from_millis(50),
                max_wait: Duration::from_millis(200),
                ..policy()
            },
        );

        events.recv().await.unwrap();

        // Changes every 30ms never leave a 50ms quiet window
        let feeder = tokio::spawn(async move {
            for i in 0..100 {
                if tx.send(change(&format!("/src/gen{i}.ts"))).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
        });

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("rebuild held back by a steady stream of changes")
            .unwrap();
        assert_eq!(event.generation, 2);
        assert!(event.succeeded());
        assert!(!event.source_changes.is_empty());

        feeder.abort();
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_changes_during_build_are_merged() {
        let pipeline = Scripted::new(
            vec![
                Ok(manifest(&[("/app.js", "a")])),
                Ok(manifest(&[("/app.js", "b")])),
                Ok(manifest(&[("/app.js", "c")])),
            ],
            Duration::from_millis(100),
        );
        let (tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(pipeline.clone(), rx, policy());

        // Arrive while the initial build is still running
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(change("/src/a.ts")).await.unwrap();
        tx.send(change("/src/b.ts")).await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(first.source_changes.is_empty());

        let second = events.recv().await.unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(
            second.source_changes,
            vec![PathBuf::from("/src/a.ts"), PathBuf::from("/src/b.ts")]
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failure_diffs_against_last_good() {
        let pipeline = Scripted::new(
            vec![
                Ok(manifest(&[("/app.js", "a")])),
                Err(BuildFailure::new("boom")),
                Ok(manifest(&[("/app.js", "b")])),
            ],
            Duration::ZERO,
        );
        let (tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(pipeline, rx, policy());

        events.recv().await.unwrap();

        tx.send(change("/src/a.ts")).await.unwrap();
        let failed = events.recv().await.unwrap();
        assert_eq!(failed.generation, 2);
        assert!(matches!(&failed.outcome, BuildOutcome::Failed { error } if error == "boom"));

        tx.send(change("/src/a.ts")).await.unwrap();
        let recovered = events.recv().await.unwrap();
        assert_eq!(recovered.generation, 3);
        match recovered.outcome {
            BuildOutcome::Succeeded { changes, .. } => {
                assert_eq!(changes.modified, vec!["/app.js"]);
            }
            BuildOutcome::Failed { .. } => panic!("expected success"),
        }

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_watch_disabled_builds_once() {
        let pipeline = Scripted::new(vec![Ok(manifest(&[("/index.html", "a")]))], Duration::ZERO);
        let (tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(
            pipeline.clone(),
            rx,
            BuildPolicy {
                watch: false,
                ..policy()
            },
        );

        assert!(events.recv().await.unwrap().succeeded());
        let _ = tx.send(change("/src/a.ts")).await;

        assert!(events.recv().await.is_none());
        assert_eq!(handle.state(), WatcherState::Disabled);
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_abandons_in_flight_build() {
        let pipeline = Scripted::new(
            vec![Ok(manifest(&[("/index.html", "a")]))],
            Duration::from_secs(30),
        );
        let (_tx, rx) = mpsc::channel(8);
        let (handle, mut events) = BuildWatcher::spawn(pipeline, rx, policy());

        let mut state = handle.subscribe_state();
        state
            .wait_for(|s| *s == WatcherState::Building)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .unwrap();
        assert!(events.recv().await.is_none());
    }
}
