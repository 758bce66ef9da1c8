use crate::models::ProcessingOptions;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration from `calcrelay.yaml`.
///
/// Every section has defaults so a missing or partial file still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub executable: ExecutableSettings,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub ui: UiSettings,
}

/// How the runtime mode is chosen when resolving the external tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    #[default]
    Auto,
    Development,
    Packaged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableSettings {
    /// File name of the external tool, without the platform suffix.
    #[serde(default = "default_executable_name")]
    pub name: String,

    /// Overrides the development base directory (`<crate>/bin`).
    #[serde(default)]
    pub development_dir: Option<Utf8PathBuf>,

    /// Overrides the packaged base directory (`<exe dir>/bin`).
    #[serde(default)]
    pub packaged_dir: Option<Utf8PathBuf>,

    #[serde(default)]
    pub mode: ModeSetting,
}

impl Default for ExecutableSettings {
    fn default() -> Self {
        Self {
            name: default_executable_name(),
            development_dir: None,
            packaged_dir: None,
            mode: ModeSetting::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Kill the tool after this many seconds. 0 disables the timeout.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Capacity of each run's event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            event_buffer: default_event_buffer(),
        }
    }
}

impl RunSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_true")]
    pub console: bool,

    #[serde(default = "default_log_directory")]
    pub directory: String,

    /// Write the log file as JSON lines instead of plain text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug: false,
            console: true,
            directory: default_log_directory(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSettings {
    /// Directory the file picker opens in.
    #[serde(default)]
    pub last_directory: Option<Utf8PathBuf>,

    /// Options pre-selected when the window opens.
    #[serde(default)]
    pub default_options: ProcessingOptions,

    /// File picker filters, shown in this order.
    #[serde(default = "default_file_filters")]
    pub file_filters: IndexMap<String, Vec<String>>,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            last_directory: None,
            default_options: ProcessingOptions::default(),
            file_filters: default_file_filters(),
        }
    }
}

fn default_executable_name() -> String {
    "calc-engine".to_string()
}

fn default_event_buffer() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_file_filters() -> IndexMap<String, Vec<String>> {
    let mut filters = IndexMap::new();
    filters.insert(
        "Data files".to_string(),
        vec!["csv".to_string(), "tsv".to_string()],
    );
    filters.insert("All files".to_string(), vec!["*".to_string()]);
    filters
}
