//! calcrelay - Desktop shell for an external table calculator
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint GUI frontend for calcrelay. It initializes:
//! - Configuration loading ([`ConfigManager`]) from `calcrelay-data/calcrelay.yaml`
//! - Logging infrastructure (daily file rotation + optional console output)
//! - Tokio async runtime (4 worker threads for subprocess execution)
//! - State management ([`StateManager`]) and the processing core ([`App`])
//! - GUI controller ([`GuiController`] - bridges Slint UI with the core)
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: Run the external tool and relay its output
//! - **Bridge threads**: One per window, marshalling updates onto the event loop
//!
//! # Execution Flow
//!
//! 1. Load `calcrelay.yaml` (defaults if absent, `CALCRELAY__*` env overrides)
//! 2. Initialize logging → logs/calcrelay.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Create StateManager and App
//! 5. Create GuiController (wires Slint UI to state and runtime)
//! 6. Run Slint event loop (blocks until window closed)
//! 7. Shutdown tokio runtime with 5s timeout

use anyhow::Result;
use calcrelay::ui::GuiController;
use calcrelay::{APP_NAME, App, ConfigManager, StateManager, VERSION};
use std::sync::Arc;
use std::time::Duration;

const CONFIG_DIR: &str = "calcrelay-data";
const WORKER_THREADS: usize = 4;

/// Main entry point for the calcrelay GUI application
///
/// # Errors
///
/// This function can fail if:
/// - The configuration file is invalid YAML
/// - Logging initialization fails (disk space, permissions)
/// - Tokio runtime creation fails (system resources)
/// - Slint UI initialization fails (graphics drivers, display)
fn main() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::new(CONFIG_DIR)?);
    let config = config_manager.load_config()?;

    // Held until exit so buffered log lines are flushed
    let _log_guard = calcrelay::logging::setup_logging(&config.logging, APP_NAME)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Configuration loaded from {}", config_manager.config_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("calcrelay-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let state_manager = Arc::new(StateManager::new());

    // The controller reports the real OS scheme once its window exists
    let app = App::new(&config, false);
    let metrics = Arc::clone(app.metrics());

    let gui_controller = GuiController::new(
        app,
        Arc::clone(&state_manager),
        config_manager,
        config,
        runtime.handle().clone(),
    )?;

    tracing::info!("GUI controller initialized, launching window");

    // Run the GUI (blocks until window is closed)
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
