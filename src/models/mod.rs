//! Data models for calcrelay.
//!
//! - [`ProcessingOptions`] / [`ProcessingRequest`]: what the user asked for in one run
//! - [`ProcessingResult`]: the single terminal outcome of a run, with [`ErrorKind`] on failure
//! - [`AppState`]: what the main window shows, owned by [`StateManager`](crate::state::StateManager)
//! - [`AppConfig`]: settings loaded from `calcrelay.yaml`

pub mod app_state;
pub mod config;
pub mod options;
pub mod result;

pub use app_state::{AppState, MAX_CONSOLE_BYTES};
pub use config::{
    AppConfig, ExecutableSettings, LoggingSettings, ModeSetting, RunSettings, UiSettings,
};
pub use options::{
    ACCEPTED_EXTENSIONS, ProcessingOptions, ProcessingRequest, STD_SENTINEL, is_accepted_input,
};
pub use result::{ErrorKind, OutputFiles, ProcessingResult};
