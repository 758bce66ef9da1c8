use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Standard name the external tool assumes when no `-STD` flag is given.
///
/// Passing it explicitly is redundant, so the command builder never emits it.
pub const STD_SENTINEL: &str = "STD";

/// File extensions the input picker accepts (compared case-insensitively).
pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "tsv"];

/// User-selected switches for one processing run.
///
/// Supplied fresh by the caller for every run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub use_area: bool,

    #[serde(default = "default_std_name")]
    pub std_name: String,

    #[serde(default)]
    pub use_gbk: bool,

    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            use_area: false,
            std_name: default_std_name(),
            use_gbk: false,
            dev_mode: false,
        }
    }
}

fn default_std_name() -> String {
    STD_SENTINEL.to_string()
}

/// A single request to process one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingRequest {
    pub input_path: Utf8PathBuf,
    pub options: ProcessingOptions,
}

impl ProcessingRequest {
    pub fn new(input_path: impl Into<Utf8PathBuf>, options: ProcessingOptions) -> Self {
        Self {
            input_path: input_path.into(),
            options,
        }
    }
}

/// Check whether a picked file has one of the accepted input extensions.
///
/// The picker offers an "All files" fallback; anything it returns still has
/// to pass this check before it is submitted.
pub fn is_accepted_input(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}
