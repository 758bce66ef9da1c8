// GUI Controller - Bridges Slint UI with the processing core
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow and the detachable OutputWindow)
// - StateManager (application state)
// - App (theme broadcaster, orchestrator, reporter)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Setting up UI callbacks → async tasks
// - Subscribing to state and theme changes → UI updates
// - File browser dialogs
// - Run submission, cancellation and artifact opening

use crate::app::App;
use crate::config::ConfigManager;
use crate::models::{
    AppConfig, ErrorKind, ProcessingOptions, ProcessingRequest, ProcessingResult,
    is_accepted_input,
};
use crate::services::{ResultReporter, RunEvent, RunHandle};
use crate::state::{StateChange, StateManager};
use crate::theme::{ThemePreference, ThemeUpdate};
use crate::ui::binding::{Binding, bind_state, bind_theme};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use slint::ComponentHandle;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

// Include the generated Slint code
slint::include_modules!();

const IDLE_STATUS: &str = "Select a .csv or .tsv file to begin";

/// How long `run()` waits for a cancelled tool to be killed after the window closes
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Everything a callback needs, cloned into each closure.
#[derive(Clone)]
struct Shared {
    app: App,
    state: Arc<StateManager>,
    config_manager: Arc<ConfigManager>,
    config: Arc<Mutex<AppConfig>>,
    cancel_tx: Arc<watch::Sender<bool>>,
    bridge: EventLoopBridgeHandle<MainWindow>,
    runtime: tokio::runtime::Handle,
}

/// The detached console window, alive while it is shown.
struct DetachedOutput {
    window: OutputWindow,
    _bridge: EventLoopBridge<OutputWindow>,
    _bindings: Vec<Binding>,
}

type OutputSlot = Rc<RefCell<Option<DetachedOutput>>>;

/// GUI Controller that wires up the Slint UI with application state and logic
///
/// This is the main coordinator for the GUI layer. It:
/// - Creates the EventLoopBridge for tokio/Slint coordination
/// - Sets up Slint callbacks to trigger runs and theme changes
/// - Binds each window to the theme broadcaster and the StateManager
/// - Handles file browser dialogs using the `rfd` crate
///
/// # Example
/// ```ignore
/// let app = App::new(&config, false);
/// let controller = GuiController::new(
///     app,
///     state_manager,
///     config_manager,
///     config,
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Event loop bridge for coordinating between tokio and Slint
    _bridge: EventLoopBridge<MainWindow>,

    /// Theme and state subscriptions of the main window
    _bindings: Vec<Binding>,

    /// Shared state manager
    state_manager: Arc<StateManager>,

    /// Send `true` to cancel the active run
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `app` - The processing core
    /// * `state_manager` - Shared application state manager
    /// * `config_manager` - Used to remember the last picker directory
    /// * `config` - The loaded configuration
    /// * `tokio_handle` - Handle to the tokio runtime for spawning async tasks
    pub fn new(
        app: App,
        state_manager: Arc<StateManager>,
        config_manager: Arc<ConfigManager>,
        config: AppConfig,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        // Create the Slint UI
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        // The palette reports the OS scheme once the window exists
        app.theme().set_system_is_dark(ui.get_os_dark());

        let bridge = EventLoopBridge::new(&ui, tokio_handle.clone(), Arc::clone(app.metrics()));
        let (cancel_tx, _) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        state_manager.set_options(config.ui.default_options.clone());
        state_manager.set_status(IDLE_STATUS);

        let shared = Shared {
            app,
            state: Arc::clone(&state_manager),
            config_manager,
            config: Arc::new(Mutex::new(config)),
            cancel_tx: Arc::clone(&cancel_tx),
            bridge: bridge.clone_handle(),
            runtime: tokio_handle,
        };

        // Initialize UI with current state
        Self::sync_ui_with_state(&ui, &shared);

        let output_slot: OutputSlot = Rc::new(RefCell::new(None));
        Self::setup_callbacks(&ui, &shared, &output_slot);

        let state = Arc::clone(&state_manager);
        let bindings = vec![
            bind_theme(&shared.bridge, shared.app.theme(), apply_theme),
            bind_state(&shared.bridge, &state_manager, move |bridge, change| {
                Self::on_state_change(&state, bridge, change)
            }),
        ];

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            _bindings: bindings,
            state_manager,
            cancel_tx,
        })
    }

    /// Run the GUI (blocks until window is closed)
    ///
    /// A run still active when the window closes is cancelled.
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();

        if self.state_manager.read(|s| s.is_processing) {
            tracing::warn!("Window closed during processing - cancelling run");
            self.request_cancel();
            std::thread::sleep(CANCEL_GRACE);
        }

        result
    }

    /// Request cancellation of the active run, if any
    pub fn request_cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel_tx.send_replace(true);
    }

    /// Synchronize UI with current state
    ///
    /// This is called once at startup; afterwards the bindings keep it current.
    fn sync_ui_with_state(ui: &MainWindow, shared: &Shared) {
        let state = shared.state.snapshot();

        ui.set_selected_file(
            state
                .selected_file
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default()
                .into(),
        );
        apply_options(ui, &state.options);

        ui.set_is_processing(state.is_processing);
        ui.set_can_submit(state.can_submit());
        ui.set_console_text(state.console_log.clone().into());
        ui.set_status_message(state.status_message.clone().into());
        ui.set_has_summary(false);
        ui.set_has_calculation(false);

        let theme = shared.app.theme();
        apply_theme(
            ui,
            ThemeUpdate {
                preference: theme.preference(),
                is_dark: theme.is_dark(),
            },
        );

        tracing::debug!("UI synchronized with initial state");
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(ui: &MainWindow, shared: &Shared, output_slot: &OutputSlot) {
        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_browse_input(move || {
            tracing::debug!("Browse input clicked");
            if let Some(ui) = ui_weak.upgrade() {
                Self::browse_input(&ui, &ctx);
            }
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_options_changed(move || {
            if let Some(ui) = ui_weak.upgrade() {
                ctx.state.set_options(read_options(&ui));
            }
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_start_processing(move || {
            tracing::info!("Process button clicked");
            if let Some(ui) = ui_weak.upgrade() {
                Self::start_processing(&ui, &ctx);
            }
        });

        let ctx = shared.clone();
        ui.on_stop_processing(move || {
            tracing::info!("Stop button clicked - requesting cancellation");
            ctx.cancel_tx.send_replace(true);
            ctx.state.set_status("Stopping...");
        });

        let ctx = shared.clone();
        ui.on_clear_console(move || {
            if !ctx.state.read(|s| s.is_processing) {
                ctx.state.reset();
                ctx.state.set_status(IDLE_STATUS);
            }
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_open_summary(move || {
            if let Some(ui) = ui_weak.upgrade() {
                Self::open_artifact(&ui, &ctx, |result| result.output_files.summary.clone());
            }
        });

        let ctx = shared.clone();
        let ui_weak = ui.as_weak();
        ui.on_open_calculation(move || {
            if let Some(ui) = ui_weak.upgrade() {
                Self::open_artifact(&ui, &ctx, |result| {
                    result.output_files.calculation.clone()
                });
            }
        });

        let ctx = shared.clone();
        let slot = Rc::clone(output_slot);
        let ui_weak = ui.as_weak();
        ui.on_open_output_window(move || {
            if let Err(e) = Self::open_output_window(&ctx, &slot) {
                tracing::error!("Failed to open output window: {:#}", e);
                if let Some(ui) = ui_weak.upgrade() {
                    show_error_dialog(
                        &ui,
                        "Could not open window",
                        "The output window could not be created.",
                        format!("{:#}", e),
                    );
                }
            }
        });

        // Theme commands
        let ctx = shared.clone();
        ui.on_toggle_theme(move || {
            ctx.app.toggle_theme();
        });

        let ctx = shared.clone();
        ui.on_set_theme(move |label| match ThemePreference::from_label(&label) {
            Some(preference) => {
                ctx.app.set_theme(preference);
            }
            None => tracing::warn!("Unknown theme preference: {}", label),
        });

        let ctx = shared.clone();
        ui.on_reset_theme(move || {
            ctx.app.reset_theme_to_system();
        });

        let ctx = shared.clone();
        ui.on_os_theme_changed(move |is_dark| {
            ctx.app.theme().set_system_is_dark(is_dark);
        });

        // Dialogs
        let ui_weak = ui.as_weak();
        ui.on_error_dialog_dismissed(move || {
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_error_dialog(false);
            }
        });

        let ctx = shared.clone();
        let slot = Rc::clone(output_slot);
        let ui_weak = ui.as_weak();
        ui.on_close_confirmation_proceed(move || {
            tracing::info!("User confirmed exit during processing - cancelling run");
            ctx.cancel_tx.send_replace(true);
            close_output_window(&slot);

            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
                ui.window().hide().ok();
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_close_confirmation_cancelled(move || {
            tracing::info!("User cancelled exit - run continues");
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
            }
        });

        // Window close event handler
        let ctx = shared.clone();
        let slot = Rc::clone(output_slot);
        let ui_weak = ui.as_weak();
        ui.window().on_close_requested(move || {
            if ctx.state.read(|s| s.is_processing) {
                tracing::info!("Close requested during processing - showing confirmation dialog");
                if let Some(ui) = ui_weak.upgrade() {
                    ui.set_show_close_confirmation(true);
                }
                slint::CloseRequestResponse::KeepWindowShown
            } else {
                tracing::info!("Close requested - allowing window to close");
                close_output_window(&slot);
                slint::CloseRequestResponse::HideWindow
            }
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Apply a state change to the main window
    ///
    /// Runs on a tokio worker; UI access goes through the bridge.
    fn on_state_change(
        state: &StateManager,
        bridge: &EventLoopBridgeHandle<MainWindow>,
        change: StateChange,
    ) {
        match change {
            StateChange::FileSelected { path } => {
                tracing::debug!("Input selected: {:?}", path);
                let text = path.map(|p| p.to_string()).unwrap_or_default();
                let can_submit = state.read(|s| s.can_submit());
                bridge.update_ui(move |ui| {
                    ui.set_selected_file(text.into());
                    ui.set_can_submit(can_submit);
                });
            }

            StateChange::OptionsChanged => {
                // The window is the source of option edits
                tracing::debug!("Processing options changed");
            }

            StateChange::RunStarted { run_id } => {
                tracing::info!("Run {} started", run_id);
                bridge.update_ui(|ui| {
                    ui.set_is_processing(true);
                    ui.set_can_submit(false);
                    ui.set_console_text("".into());
                    ui.set_last_run_failed(false);
                    ui.set_has_summary(false);
                    ui.set_has_calculation(false);
                });
            }

            StateChange::OutputAppended { .. } => {
                let text = state.read(|s| s.console_log.clone());
                bridge.update_ui(move |ui| {
                    ui.set_console_text(text.into());
                });
            }

            StateChange::RunFinished { success, summary } => {
                tracing::info!("Run finished (success: {}): {}", success, summary);
                let (text, can_submit, has_summary, has_calculation) = state.read(|s| {
                    let files = s.last_result.as_ref().map(|r| &r.output_files);
                    (
                        s.console_log.clone(),
                        s.can_submit(),
                        files.is_some_and(|f| f.summary.is_some()),
                        files.is_some_and(|f| f.calculation.is_some()),
                    )
                });

                // Dropped chunk updates are caught up here
                bridge.update_ui(move |ui| {
                    ui.set_is_processing(false);
                    ui.set_can_submit(can_submit);
                    ui.set_console_text(text.into());
                    ui.set_last_run_failed(!success);
                    ui.set_has_summary(has_summary);
                    ui.set_has_calculation(has_calculation);
                });
            }

            StateChange::StatusChanged { message } => {
                bridge.update_ui(move |ui| {
                    ui.set_status_message(message.into());
                });
            }

            StateChange::StateReset => {
                tracing::info!("State reset");
                let can_submit = state.read(|s| s.can_submit());
                bridge.update_ui(move |ui| {
                    ui.set_is_processing(false);
                    ui.set_can_submit(can_submit);
                    ui.set_console_text("".into());
                    ui.set_last_run_failed(false);
                    ui.set_has_summary(false);
                    ui.set_has_calculation(false);
                });
            }
        }
    }

    fn browse_input(ui: &MainWindow, ctx: &Shared) {
        let (filters, start_dir) = {
            let config = ctx.config.lock().unwrap_or_else(PoisonError::into_inner);
            (
                config.ui.file_filters.clone(),
                config.ui.last_directory.clone(),
            )
        };

        let Some(path) = Self::show_file_picker("Select Input File", &filters, start_dir.as_deref())
        else {
            return;
        };

        if !is_accepted_input(&path) {
            tracing::warn!("Rejected input with unsupported extension: {}", path);
            show_error_dialog(
                ui,
                "Unsupported file",
                format!("{} is not a .csv or .tsv file.", path.file_name().unwrap_or(path.as_str())),
                "",
            );
            return;
        }

        tracing::info!("Input selected: {}", path);
        ctx.state.select_file(Some(path.clone()));
        Self::remember_directory(ctx, &path);
    }

    /// Persist the picked file's directory as the picker's next start point
    fn remember_directory(ctx: &Shared, path: &Utf8Path) {
        let Some(dir) = path.parent() else {
            return;
        };

        let mut config = ctx.config.lock().unwrap_or_else(PoisonError::into_inner);
        if config.ui.last_directory.as_deref() == Some(dir) {
            return;
        }

        config.ui.last_directory = Some(dir.to_path_buf());
        if let Err(e) = ctx.config_manager.save_config(&config) {
            tracing::warn!("Failed to remember last directory: {:#}", e);
        }
    }

    fn start_processing(ui: &MainWindow, ctx: &Shared) {
        let Some(input) = ctx
            .state
            .read(|s| s.can_submit().then(|| s.selected_file.clone()).flatten())
        else {
            tracing::warn!("Process requested with no input or while a run is active");
            return;
        };

        let options = read_options(ui);
        ctx.state.set_options(options.clone());

        // Claim the run slot before anything is launched
        let run_id = ctx.app.reserve_run_id();
        if ctx.state.start_run(run_id).is_none() {
            return;
        }

        ctx.cancel_tx.send_replace(false);
        let cancel_rx = ctx.cancel_tx.subscribe();

        let handle = {
            let _guard = ctx.runtime.enter();
            ctx.app.process_file_as(
                run_id,
                ProcessingRequest::new(input, options),
                Some(cancel_rx),
            )
        };

        let bridge = ctx.bridge.clone();
        let ctx = ctx.clone();
        bridge.spawn_async(move || async move {
            Self::collect_run(ctx, handle).await;
        });
    }

    /// Relay a run's output into the state, then record its result
    async fn collect_run(ctx: Shared, handle: RunHandle) {
        let run_id = handle.run_id();
        let state = Arc::clone(&ctx.state);

        let result = ctx
            .app
            .reporter()
            .collect(handle, |event| match event {
                RunEvent::Progress(text) => {
                    state.append_output(text, false);
                }
                RunEvent::Error(text) => {
                    state.append_output(text, true);
                }
                RunEvent::Completed(_) => {}
            })
            .await;

        let summary = ResultReporter::summary_line(&result);
        tracing::info!("Run {}: {}", run_id, summary);

        if let Some((title, message, details)) = error_dialog_for(&result) {
            ctx.bridge.update_ui(move |ui| {
                show_error_dialog(ui, title, message, details);
            });
        }

        ctx.state.finish_run(result, summary);
    }

    fn open_artifact<F>(ui: &MainWindow, ctx: &Shared, pick: F)
    where
        F: FnOnce(&ProcessingResult) -> Option<Utf8PathBuf>,
    {
        let Some(path) = ctx.state.read(|s| s.last_result.as_ref().and_then(pick)) else {
            return;
        };

        if !ctx.app.open_file(&path) {
            show_error_dialog(
                ui,
                "Could not open file",
                format!("{} could not be opened.", path),
                "It may have been moved or deleted since the run finished.",
            );
        }
    }

    fn open_output_window(ctx: &Shared, slot: &OutputSlot) -> Result<()> {
        if let Some(existing) = slot.borrow().as_ref() {
            existing.window.show().context("Failed to show output window")?;
            return Ok(());
        }

        let window = OutputWindow::new().context("Failed to create output window")?;
        window.global::<Theme>().set_dark(ctx.app.theme().is_dark());

        let (console, status) =
            ctx.state.read(|s| (s.console_log.clone(), s.status_message.clone()));
        window.set_console_text(console.into());
        window.set_status_message(status.into());

        let bridge = EventLoopBridge::new(&window, ctx.runtime.clone(), Arc::clone(ctx.app.metrics()));
        let handle = bridge.clone_handle();
        let state = Arc::clone(&ctx.state);

        let bindings = vec![
            bind_theme(&handle, ctx.app.theme(), |window: &OutputWindow, update| {
                window.global::<Theme>().set_dark(update.is_dark);
            }),
            bind_state(&handle, &ctx.state, move |bridge, change| match change {
                StateChange::StatusChanged { message } => {
                    bridge.update_ui(move |window| window.set_status_message(message.into()));
                }
                StateChange::OutputAppended { .. }
                | StateChange::RunStarted { .. }
                | StateChange::RunFinished { .. }
                | StateChange::StateReset => {
                    let text = state.read(|s| s.console_log.clone());
                    bridge.update_ui(move |window| window.set_console_text(text.into()));
                }
                _ => {}
            }),
        ];

        let slot_weak = Rc::downgrade(slot);
        window.window().on_close_requested(move || {
            // The component can't be dropped from inside its own callback
            let slot_weak = slot_weak.clone();
            slint::Timer::single_shot(Duration::ZERO, move || {
                if let Some(slot) = slot_weak.upgrade() {
                    slot.borrow_mut().take();
                    tracing::debug!("Output window closed");
                }
            });
            slint::CloseRequestResponse::HideWindow
        });

        window.show().context("Failed to show output window")?;

        *slot.borrow_mut() = Some(DetachedOutput {
            window,
            _bridge: bridge,
            _bindings: bindings,
        });

        tracing::info!("Output window opened");
        Ok(())
    }

    /// Show a native file picker dialog
    ///
    /// Uses the `rfd` crate; filters are shown in configuration order.
    ///
    /// # Returns
    /// The selected file path, or None if cancelled
    fn show_file_picker(
        title: &str,
        filters: &IndexMap<String, Vec<String>>,
        start_dir: Option<&Utf8Path>,
    ) -> Option<Utf8PathBuf> {
        use rfd::FileDialog;

        let mut dialog = FileDialog::new().set_title(title);

        if let Some(dir) = start_dir.filter(|dir| dir.is_dir()) {
            dialog = dialog.set_directory(dir);
        }

        for (name, extensions) in filters {
            dialog = dialog.add_filter(name, extensions.as_slice());
        }

        dialog.pick_file().and_then(|path| {
            Utf8PathBuf::try_from(path)
                .map_err(|e| {
                    tracing::error!("Failed to convert path to UTF-8: {}", e);
                    e
                })
                .ok()
        })
    }
}

fn apply_theme(ui: &MainWindow, update: ThemeUpdate) {
    ui.global::<Theme>().set_dark(update.is_dark);
    ui.set_theme_preference(update.preference.label().into());
}

fn apply_options(ui: &MainWindow, options: &ProcessingOptions) {
    ui.set_use_area(options.use_area);
    ui.set_std_name(options.std_name.clone().into());
    ui.set_use_gbk(options.use_gbk);
    ui.set_dev_mode(options.dev_mode);
}

fn read_options(ui: &MainWindow) -> ProcessingOptions {
    ProcessingOptions {
        use_area: ui.get_use_area(),
        std_name: ui.get_std_name().trim().to_string(),
        use_gbk: ui.get_use_gbk(),
        dev_mode: ui.get_dev_mode(),
    }
}

fn close_output_window(slot: &OutputSlot) {
    if let Some(output) = slot.borrow_mut().take() {
        output.window.hide().ok();
    }
}

/// Display an error dialog with the given title, message, and optional details
fn show_error_dialog(
    ui: &MainWindow,
    title: impl Into<slint::SharedString>,
    message: impl Into<slint::SharedString>,
    details: impl Into<slint::SharedString>,
) {
    ui.set_error_title(title.into());
    ui.set_error_message(message.into());
    ui.set_error_details(details.into());
    ui.set_show_error_dialog(true);
}

/// Title, message and details of the dialog a failed run deserves.
///
/// Exit-code failures and cancellations only update the status bar; their
/// output is already in the console.
fn error_dialog_for(result: &ProcessingResult) -> Option<(String, String, String)> {
    let kind = result.error_kind?;
    let title = match kind {
        ErrorKind::NonZeroExit | ErrorKind::Cancelled => return None,
        ErrorKind::InputNotFound => "Input file missing",
        ErrorKind::ExecutableNotFound => "External tool missing",
        ErrorKind::LaunchFailed => "Could not start the external tool",
        ErrorKind::TimedOut => "Processing timed out",
        ErrorKind::ProcessError | ErrorKind::ArtifactOpenFailed => "Processing failed",
    };

    Some((
        title.to_string(),
        result
            .error_message
            .clone()
            .unwrap_or_else(|| kind.to_string()),
        result.stderr.trim().to_string(),
    ))
}
