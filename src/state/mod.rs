// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for GUI updates.

use crate::models::{AppState, ProcessingOptions, ProcessingResult};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the GUI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A different input file was selected (or the selection was cleared)
    FileSelected { path: Option<Utf8PathBuf> },

    /// Processing options were changed
    OptionsChanged,

    /// A run was submitted
    RunStarted { run_id: u64 },

    /// Output relayed from the running tool
    OutputAppended { text: String, is_error: bool },

    /// The active run has produced its result
    RunFinished { success: bool, summary: String },

    /// Status bar text changed
    StatusChanged { message: String },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Rejects a second run while one is active
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state without cloning it
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`StateChange`]: Event types emitted on state mutations
/// - [`crate::ui::controller::GuiController`]: Primary consumer of state events
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 256 events; output chunks are the bulk of
    /// the traffic while a run is active.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    ///
    /// This clones the entire state, including the console log. For checking
    /// individual fields, use `read()` with a closure.
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_processing);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Output relay does not go through here; see
    /// [`append_output`](Self::append_output), which avoids cloning the
    /// console log on every chunk.
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let changes = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let before = Fields::capture(&state);

            update_fn(&mut state);

            self.detect_changes(&before, &state)
        };

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    ///
    /// Returns a receiver that will get notified of all future state changes.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(&self, old: &Fields, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.selected_file != new.selected_file {
            changes.push(StateChange::FileSelected {
                path: new.selected_file.clone(),
            });
        }

        if old.options != new.options {
            changes.push(StateChange::OptionsChanged);
        }

        if old.active_run != new.active_run {
            if let Some(run_id) = new.active_run {
                changes.push(StateChange::RunStarted { run_id });
            }
        }

        if old.is_processing && !new.is_processing {
            if let Some(result) = &new.last_result {
                changes.push(StateChange::RunFinished {
                    success: result.success,
                    summary: new.status_message.clone(),
                });
            }
        }

        if old.status_message != new.status_message {
            changes.push(StateChange::StatusChanged {
                message: new.status_message.clone(),
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Select the input file for the next run
    pub fn select_file(&self, path: Option<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| {
            state.selected_file = path;
        })
    }

    /// Replace the processing options
    pub fn set_options(&self, options: ProcessingOptions) -> Vec<StateChange> {
        self.update(|state| {
            state.options = options;
        })
    }

    /// Mark a run as active
    ///
    /// The check and the claim happen under one write lock. Returns `None`
    /// without changing anything if a run is already active.
    pub fn start_run(&self, run_id: u64) -> Option<Vec<StateChange>> {
        let mut rejected_by = None;
        let changes = self.update(|state| {
            if state.is_processing {
                rejected_by = Some(state.active_run);
                return;
            }
            state.console_log.clear();
            state.last_result = None;
            state.is_processing = true;
            state.active_run = Some(run_id);
            state.status_message = "Processing...".to_string();
        });

        match rejected_by {
            Some(active) => {
                tracing::warn!("Run {} rejected - run {:?} still active", run_id, active);
                None
            }
            None => Some(changes),
        }
    }

    /// Append relayed output to the console log
    pub fn append_output(&self, text: &str, is_error: bool) -> StateChange {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.append_console(text);
        }

        let change = StateChange::OutputAppended {
            text: text.to_string(),
            is_error,
        };
        let _ = self.state_tx.send(change.clone());
        change
    }

    /// Record the terminal result of the active run
    pub fn finish_run(&self, result: ProcessingResult, summary: String) -> Vec<StateChange> {
        self.update(|state| {
            state.is_processing = false;
            state.active_run = None;
            state.status_message = summary;
            state.last_result = Some(result);
        })
    }

    /// Set the status bar text
    pub fn set_status(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| {
            state.status_message = message;
        })
    }

    /// Reset all run-related state
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset_run_state();
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

/// The fields change detection compares, captured before an update.
struct Fields {
    selected_file: Option<Utf8PathBuf>,
    options: ProcessingOptions,
    is_processing: bool,
    active_run: Option<u64>,
    status_message: String,
}

impl Fields {
    fn capture(state: &AppState) -> Self {
        Self {
            selected_file: state.selected_file.clone(),
            options: state.options.clone(),
            is_processing: state.is_processing,
            active_run: state.active_run,
            status_message: state.status_message.clone(),
        }
    }
}
