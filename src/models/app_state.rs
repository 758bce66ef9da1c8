use crate::models::{ProcessingOptions, ProcessingResult};
use camino::Utf8PathBuf;

/// Upper bound on the console text kept in memory for the output pane.
///
/// Older text is dropped from the front once the limit is exceeded. The full
/// output of a run is still available in its [`ProcessingResult`].
pub const MAX_CONSOLE_BYTES: usize = 256 * 1024;

/// State shown by the main window.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`]; go
/// through its `read()`/`update()` methods so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Input selection
    pub selected_file: Option<Utf8PathBuf>,
    pub options: ProcessingOptions,

    // Runtime state
    pub is_processing: bool,
    pub active_run: Option<u64>,
    pub status_message: String,

    // Output
    pub console_log: String,
    pub last_result: Option<ProcessingResult>,
}

impl AppState {
    /// A run may be submitted when a file is selected and no run is active.
    pub fn can_submit(&self) -> bool {
        self.selected_file.is_some() && !self.is_processing
    }

    /// Append relayed output to the console, trimming the oldest text.
    pub fn append_console(&mut self, text: &str) {
        self.console_log.push_str(text);

        if self.console_log.len() > MAX_CONSOLE_BYTES {
            let excess = self.console_log.len() - MAX_CONSOLE_BYTES;
            let mut cut = excess;
            while !self.console_log.is_char_boundary(cut) {
                cut += 1;
            }
            self.console_log.drain(..cut);
        }
    }

    /// Clear everything left over from the previous run.
    pub fn reset_run_state(&mut self) {
        self.is_processing = false;
        self.active_run = None;
        self.console_log.clear();
        self.last_result = None;
        self.status_message.clear();
    }
}
