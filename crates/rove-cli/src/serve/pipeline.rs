//! Build pipelines: how a new [`Manifest`] is produced.
//!
//! The serve loop only needs `run_once`; what happens inside (a shell
//! command, or simply re-reading the output directory) is up to the
//! implementation.

use crate::serve::manifest::Manifest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Number of trailing output lines kept in a failure message.
const FAILURE_TAIL_LINES: usize = 30;

/// A build that did not produce usable output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildFailure {
    pub message: String,
}

impl BuildFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs one build and snapshots its output.
///
/// Dropping the returned future must abandon the build; implementations
/// that spawn processes kill them on drop.
#[async_trait]
pub trait BuildPipeline: Send + Sync + 'static {
    async fn run_once(&self) -> Result<Manifest, BuildFailure>;

    /// Short label for logs and the banner.
    fn describe(&self) -> String;
}

/// Runs a shell command, then reads the output directory.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    command: String,
    root: PathBuf,
    out_dir: PathBuf,
}

impl CommandPipeline {
    pub fn new(command: impl Into<String>, root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            root: root.into(),
            out_dir: out_dir.into(),
        }
    }

    fn shell(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", &self.command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", &self.command]);
            cmd
        };
        cmd.current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BuildPipeline for CommandPipeline {
    async fn run_once(&self) -> Result<Manifest, BuildFailure> {
        tracing::debug!(command = %self.command, "Running build command");

        let output = self.shell().output().await.map_err(|e| {
            BuildFailure::new(format!("Failed to run `{}`: {}", self.command, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            tracing::debug!(target: "rove_cli::build", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let log = if stderr.trim().is_empty() { stdout } else { stderr };
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(BuildFailure::new(format!(
                "`{}` exited with {}\n{}",
                self.command,
                code,
                tail(&log, FAILURE_TAIL_LINES)
            )));
        }

        read_output(&self.out_dir).await
    }

    fn describe(&self) -> String {
        self.command.clone()
    }
}

/// Reads the output directory as-is, for builds driven by another process.
#[derive(Debug, Clone)]
pub struct OutputDirPipeline {
    out_dir: PathBuf,
}

impl OutputDirPipeline {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl BuildPipeline for OutputDirPipeline {
    async fn run_once(&self) -> Result<Manifest, BuildFailure> {
        read_output(&self.out_dir).await
    }

    fn describe(&self) -> String {
        format!("existing output in {}", self.out_dir.display())
    }
}

async fn read_output(out_dir: &Path) -> Result<Manifest, BuildFailure> {
    if !out_dir.is_dir() {
        return Err(BuildFailure::new(format!(
            "Output directory {} does not exist",
            out_dir.display()
        )));
    }

    let dir = out_dir.to_path_buf();
    tokio::task::spawn_blocking(move || Manifest::read_dir(&dir))
        .await
        .map_err(|e| BuildFailure::new(format!("Output snapshot task failed: {}", e)))?
        .map_err(|e| {
            BuildFailure::new(format!(
                "Failed to read output directory {}: {}",
                out_dir.display(),
                e
            ))
        })
}

fn tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_output_dir_pipeline_reads_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html"), "<html></html>").unwrap();

        let manifest = OutputDirPipeline::new(temp.path()).run_once().await.unwrap();
        assert!(manifest.contains("/index.html"));
    }

    #[tokio::test]
    async fn test_output_dir_pipeline_missing_dir() {
        let temp = TempDir::new().unwrap();
        let err = OutputDirPipeline::new(temp.path().join("dist"))
            .run_once()
            .await
            .unwrap_err();
        assert!(err.message.contains("does not exist"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_pipeline_builds_output() {
        let temp = TempDir::new().unwrap();
        let pipeline = CommandPipeline::new(
            "mkdir -p dist && echo '<html></html>' > dist/index.html",
            temp.path(),
            temp.path().join("dist"),
        );

        let manifest = pipeline.run_once().await.unwrap();
        assert!(manifest.contains("/index.html"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_pipeline_failure_keeps_stderr() {
        let temp = TempDir::new().unwrap();
        let pipeline = CommandPipeline::new(
            "echo 'syntax error in app.ts' >&2; exit 3",
            temp.path(),
            temp.path().join("dist"),
        );

        let err = pipeline.run_once().await.unwrap_err();
        assert!(err.message.contains("exited with 3"));
        assert!(err.message.contains("syntax error in app.ts"));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}
