//! Core entry points shared by the GUI and the tests.
//!
//! [`App`] bundles the theme state, the orchestrator and the reporter so a UI
//! surface only needs one handle. It holds no UI types.

use crate::metrics::Metrics;
use crate::models::{AppConfig, ProcessingRequest};
use crate::services::{
    ExecutableLocator, ProcessOrchestrator, ResultReporter, RunControl, RunHandle,
};
use crate::theme::{ThemePreference, ThemeState, ThemeSubscription};
use camino::Utf8Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Facade over the theme broadcaster, the orchestrator and the reporter.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct App {
    theme: ThemeState,
    orchestrator: ProcessOrchestrator,
    reporter: ResultReporter,
    metrics: Arc<Metrics>,
    run_timeout: Option<Duration>,
}

impl App {
    /// Wire the core from the loaded configuration.
    pub fn new(config: &AppConfig, system_is_dark: bool) -> Self {
        let metrics = Arc::new(Metrics::new());
        let locator = ExecutableLocator::from_settings(&config.executable);

        tracing::info!(
            "External tool expected at {} ({:?} mode)",
            locator.resolve(),
            locator.mode
        );

        let orchestrator = ProcessOrchestrator::new(locator, Arc::clone(&metrics))
            .with_event_buffer(config.run.event_buffer);
        let theme = ThemeState::new(system_is_dark).with_metrics(Arc::clone(&metrics));

        Self {
            theme,
            orchestrator,
            reporter: ResultReporter::default(),
            metrics,
            run_timeout: config.run.timeout(),
        }
    }

    /// Assemble from existing parts.
    pub fn from_parts(
        theme: ThemeState,
        orchestrator: ProcessOrchestrator,
        reporter: ResultReporter,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            theme,
            orchestrator,
            reporter,
            metrics,
            run_timeout: None,
        }
    }

    /// Timeout applied by [`process_file`](Self::process_file).
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn set_theme(&self, preference: ThemePreference) -> bool {
        self.theme.set_preference(preference)
    }

    pub fn toggle_theme(&self) -> bool {
        self.theme.toggle()
    }

    pub fn reset_theme_to_system(&self) {
        self.theme.reset_to_system();
    }

    pub fn subscribe_theme_updates(&self) -> ThemeSubscription {
        self.theme.subscribe()
    }

    /// Submit a run with the configured timeout and an optional cancel flag.
    ///
    /// Must be called from within a tokio runtime.
    pub fn process_file(
        &self,
        request: ProcessingRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> RunHandle {
        self.process_file_as(self.reserve_run_id(), request, cancel)
    }

    /// Id for the next run, so callers can claim it before launching.
    pub fn reserve_run_id(&self) -> u64 {
        self.orchestrator.reserve_run_id()
    }

    /// [`process_file`](Self::process_file) under a reserved id.
    pub fn process_file_as(
        &self,
        run_id: u64,
        request: ProcessingRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> RunHandle {
        let mut control = RunControl::new().with_timeout(self.run_timeout);
        if let Some(cancel) = cancel {
            control = control.with_cancel(cancel);
        }
        self.orchestrator.submit_as(run_id, request, control)
    }

    pub fn open_file(&self, path: &Utf8Path) -> bool {
        self.reporter.open_artifact(path)
    }

    pub fn theme(&self) -> &ThemeState {
        &self.theme
    }

    pub fn reporter(&self) -> &ResultReporter {
        &self.reporter
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
