use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a processing run (or an artifact action) did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested input file was absent at submission time.
    InputNotFound,
    /// The external tool is missing at the resolved path.
    ExecutableNotFound,
    /// The OS refused to start the process.
    LaunchFailed,
    /// The process started but terminated abnormally (signal, wait failure).
    ProcessError,
    /// The process ran to completion but reported failure via its exit code.
    NonZeroExit,
    /// A requested artifact no longer exists when the user tries to open it.
    ArtifactOpenFailed,
    /// The caller cancelled the run; the child was killed.
    Cancelled,
    /// The run exceeded its configured timeout; the child was killed.
    TimedOut,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputNotFound => "input not found",
            ErrorKind::ExecutableNotFound => "executable not found",
            ErrorKind::LaunchFailed => "launch failed",
            ErrorKind::ProcessError => "process error",
            ErrorKind::NonZeroExit => "non-zero exit",
            ErrorKind::ArtifactOpenFailed => "artifact open failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output artifacts discovered after a successful run.
///
/// Each field is set only if the file existed when the run was finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub summary: Option<Utf8PathBuf>,
    pub calculation: Option<Utf8PathBuf>,
}

impl OutputFiles {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.calculation.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.summary.iter().chain(self.calculation.iter())
    }
}

/// Terminal outcome of one processing run, handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_files: OutputFiles,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub duration: Duration,
}

impl ProcessingResult {
    /// Result of a run that exited with code 0.
    pub fn succeeded(
        stdout: String,
        stderr: String,
        output_files: OutputFiles,
        duration: Duration,
    ) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout,
            stderr,
            output_files,
            error_kind: None,
            error_message: None,
            duration,
        }
    }

    /// Result of a run that failed before producing any output.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            output_files: OutputFiles::default(),
            error_kind: Some(kind),
            error_message: Some(message.into()),
            duration: Duration::ZERO,
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}
