//! File system watcher feeding the build watcher.
//!
//! Watches the project root (or just the output directory when another
//! process does the building) and filters out node_modules, hidden files,
//! the output directory itself and other configured patterns.

use crate::error::{CliError, Result, ServeError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Capacity of the change channel; the build watcher drains it continuously.
const CHANGE_QUEUE: usize = 256;

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// File was modified
    Modified(PathBuf),
    /// File was created
    Created(PathBuf),
    /// File was removed
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Recursive watcher that forwards filtered changes through a channel.
///
/// Debouncing is left to the consumer, which coalesces bursts into one build.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// `ignored_dirs` are absolute directories whose contents never count as
    /// a change (the build output when the root is watched).
    ///
    /// # Errors
    ///
    /// Returns error if watcher cannot be created or directory doesn't exist
    pub fn new(
        root: PathBuf,
        ignore_patterns: Vec<String>,
        ignored_dirs: Vec<PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(CHANGE_QUEUE);
        let filter_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "File watcher error");
                    return;
                }
            };

            for path in &event.paths {
                if Self::should_ignore(path, &filter_root, &ignore_patterns, &ignored_dirs) {
                    continue;
                }

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                tracing::trace!(path = %path.display(), "File change");

                // Receiver gone means the build watcher stopped.
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })
        .map_err(ServeError::Watch)?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(ServeError::Watch)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    /// Check if a path should be ignored.
    ///
    /// Paths outside the root are always ignored.
    fn should_ignore(
        path: &Path,
        root: &Path,
        ignore_patterns: &[String],
        ignored_dirs: &[PathBuf],
    ) -> bool {
        if ignored_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let rel_path = match path.strip_prefix(root) {
            Ok(p) => p,
            Err(_) => return true,
        };

        let path_str = rel_path.to_string_lossy();

        for pattern in ignore_patterns {
            if pattern.starts_with('*') {
                // Suffix pattern like "*.log" or "*~"
                let suffix = pattern.trim_start_matches('*');
                if path_str.ends_with(suffix) {
                    return true;
                }
            } else if rel_path
                .components()
                .any(|c| c.as_os_str() == pattern.as_str())
            {
                return true;
            }
        }

        // Hidden files and directories
        rel_path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }

    /// Get the root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(path: &str, patterns: &[&str], dirs: &[&str]) -> bool {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let dirs: Vec<PathBuf> = dirs.iter().map(PathBuf::from).collect();
        FileWatcher::should_ignore(Path::new(path), Path::new("/project"), &patterns, &dirs)
    }

    #[test]
    fn test_should_ignore_node_modules() {
        assert!(ignored("/project/node_modules/pkg/index.js", &["node_modules"], &[]));
        assert!(ignored("/project/packages/a/node_modules/x.js", &["node_modules"], &[]));
        assert!(!ignored("/project/src/index.js", &["node_modules"], &[]));
    }

    #[test]
    fn test_directory_pattern_matches_whole_components() {
        assert!(!ignored("/project/src/target_list.js", &["target"], &[]));
        assert!(ignored("/project/target/debug/x", &["target"], &[]));
    }

    #[test]
    fn test_should_ignore_suffix() {
        assert!(ignored("/project/debug.log", &["*.log"], &[]));
        assert!(ignored("/project/src/app.ts~", &["*~"], &[]));
        assert!(!ignored("/project/src/index.js", &["*.log"], &[]));
    }

    #[test]
    fn test_should_ignore_hidden_files() {
        assert!(ignored("/project/.git/config", &[], &[]));
        assert!(ignored("/project/.env", &[], &[]));
        assert!(ignored("/project/src/.hidden/file.js", &[], &[]));
    }

    #[test]
    fn test_should_ignore_output_dir() {
        assert!(ignored("/project/dist/app.js", &[], &["/project/dist"]));
        assert!(!ignored("/project/distribution/app.js", &[], &["/project/dist"]));
    }

    #[test]
    fn test_should_ignore_outside_root() {
        assert!(ignored("/other/file.js", &[], &[]));
    }

    #[test]
    fn test_file_change_path() {
        let path = PathBuf::from("/project/src/index.js");

        assert_eq!(FileChange::Modified(path.clone()).path(), path.as_path());
        assert_eq!(FileChange::Created(path.clone()).path(), path.as_path());
        assert_eq!(FileChange::Removed(path.clone()).path(), path.as_path());
    }
}
