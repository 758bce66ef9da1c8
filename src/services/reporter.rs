use crate::models::{ErrorKind, ProcessingResult};
use crate::services::orchestrator::{RunEvent, RunHandle};
use camino::Utf8Path;
use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Opens a file with the platform's default application.
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactOpener: Send + Sync {
    fn open(&self, path: &Utf8Path) -> io::Result<()>;
}

/// [`ArtifactOpener`] backed by `explorer` / `open` / `xdg-open`.
///
/// The path is passed as a single argument; no shell is involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl ArtifactOpener for SystemOpener {
    fn open(&self, path: &Utf8Path) -> io::Result<()> {
        let program = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };

        let mut child = Command::new(program)
            .arg(path.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Reap the launcher so it does not linger as a zombie
        std::thread::spawn(move || {
            if let Err(e) = child.wait() {
                tracing::debug!("Failed to wait for {}: {}", program, e);
            }
        });

        Ok(())
    }
}

/// Turns a run into the single result the UI renders.
#[derive(Clone)]
pub struct ResultReporter {
    opener: Arc<dyn ArtifactOpener>,
}

impl ResultReporter {
    pub fn new(opener: Arc<dyn ArtifactOpener>) -> Self {
        Self { opener }
    }

    /// Forward a run's events to `on_event` until it finishes, then return
    /// its result.
    ///
    /// The terminal result is taken from the `Completed` event when this
    /// observer received it, and from the task otherwise.
    pub async fn collect<F>(&self, mut handle: RunHandle, mut on_event: F) -> ProcessingResult
    where
        F: FnMut(&RunEvent),
    {
        while let Some(event) = handle.recv().await {
            on_event(&event);
            if let RunEvent::Completed(result) = event {
                return result;
            }
        }

        handle.wait().await
    }

    /// One-line description for the status bar.
    pub fn summary_line(result: &ProcessingResult) -> String {
        if result.success {
            let names: Vec<&str> = result
                .output_files
                .iter()
                .filter_map(|path| path.file_name())
                .collect();

            if names.is_empty() {
                format!(
                    "Finished in {:.1}s - no output files were written",
                    result.duration.as_secs_f32()
                )
            } else {
                format!(
                    "Finished in {:.1}s - {}",
                    result.duration.as_secs_f32(),
                    names.join(", ")
                )
            }
        } else {
            match (result.error_kind, result.exit_code) {
                (Some(ErrorKind::NonZeroExit), Some(code)) => {
                    format!("Processing failed with exit code {}", code)
                }
                (kind, _) => {
                    let kind = kind.unwrap_or(ErrorKind::ProcessError);
                    match result.error_message.as_deref() {
                        Some(message) if !message.is_empty() => {
                            format!("Processing failed ({}): {}", kind, message)
                        }
                        _ => format!("Processing failed ({})", kind),
                    }
                }
            }
        }
    }

    /// Open an artifact in its default viewer.
    ///
    /// Returns `false` without raising if the file is gone or the platform
    /// launcher could not be started.
    pub fn open_artifact(&self, path: &Utf8Path) -> bool {
        if !path.is_file() {
            tracing::warn!("{}: {} no longer exists", ErrorKind::ArtifactOpenFailed, path);
            return false;
        }

        match self.opener.open(path) {
            Ok(()) => {
                tracing::info!("Opened artifact: {}", path);
                true
            }
            Err(e) => {
                tracing::warn!("{}: could not open {}: {}", ErrorKind::ArtifactOpenFailed, path, e);
                false
            }
        }
    }
}

impl Default for ResultReporter {
    fn default() -> Self {
        Self::new(Arc::new(SystemOpener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFiles;
    use camino::Utf8PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn temp_file(dir: &TempDir, name: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::try_from(dir.path().join(name)).unwrap();
        std::fs::write(&path, "x\ty\n").unwrap();
        path
    }

    #[test]
    fn test_open_existing_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_file(&temp_dir, "sample-summary.tsv");

        let mut opener = MockArtifactOpener::new();
        let expected = path.clone();
        opener
            .expect_open()
            .withf(move |p| p == expected.as_path())
            .times(1)
            .returning(|_| Ok(()));

        let reporter = ResultReporter::new(Arc::new(opener));
        assert!(reporter.open_artifact(&path));
    }

    #[test]
    fn test_open_deleted_artifact_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_file(&temp_dir, "sample-cal.tsv");
        std::fs::remove_file(&path).unwrap();

        let mut opener = MockArtifactOpener::new();
        opener.expect_open().never();

        let reporter = ResultReporter::new(Arc::new(opener));
        assert!(!reporter.open_artifact(&path));
    }

    #[test]
    fn test_open_failure_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_file(&temp_dir, "sample-cal.tsv");

        let mut opener = MockArtifactOpener::new();
        opener
            .expect_open()
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "xdg-open missing")));

        let reporter = ResultReporter::new(Arc::new(opener));
        assert!(!reporter.open_artifact(&path));
    }

    #[test]
    fn test_summary_line_success() {
        let result = ProcessingResult::succeeded(
            String::new(),
            String::new(),
            OutputFiles {
                summary: Some(Utf8PathBuf::from("/data/sample-summary.tsv")),
                calculation: None,
            },
            Duration::from_millis(1500),
        );
        assert_eq!(
            ResultReporter::summary_line(&result),
            "Finished in 1.5s - sample-summary.tsv"
        );
    }

    #[test]
    fn test_summary_line_non_zero_exit() {
        let result = ProcessingResult::failed(ErrorKind::NonZeroExit, "").with_exit_code(Some(2));
        assert_eq!(
            ResultReporter::summary_line(&result),
            "Processing failed with exit code 2"
        );
    }

    #[test]
    fn test_summary_line_with_message() {
        let result = ProcessingResult::failed(ErrorKind::InputNotFound, "Input file not found: /a.csv");
        assert_eq!(
            ResultReporter::summary_line(&result),
            "Processing failed (input not found): Input file not found: /a.csv"
        );
    }
}
