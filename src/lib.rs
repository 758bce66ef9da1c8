// calcrelay - Desktop shell for an external table calculator
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) provides the GUI entry point.

pub mod app;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod theme;
pub mod ui;

// Re-export commonly used types for convenience
pub use app::App;
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppConfig, AppState, ErrorKind, ProcessingOptions, ProcessingRequest, ProcessingResult};
pub use state::{StateChange, StateManager};
pub use theme::{ThemePreference, ThemeState, ThemeUpdate};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
