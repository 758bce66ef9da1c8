// EventLoopBridge - Coordinates between tokio async runtime and Slint event loop
//
// Run output arrives on tokio tasks while Slint only allows UI access from its
// own thread. The bridge provides:
// - UI updates from tokio tasks, queued onto the Slint event loop
// - Spawning async tasks from Slint callbacks
// - One bridge per window, so each window receives theme and run updates on its own

use crate::metrics::Metrics;
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Pending UI updates per window before new ones are dropped
const UI_UPDATE_CAPACITY: usize = 100;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Coordinates between tokio async runtime and Slint event loop
///
/// This bridge enables:
/// - UI updates from background tokio tasks (via `update_ui()`)
/// - Spawning async tasks from Slint callbacks (via `spawn_async()`)
///
/// # Example
/// ```ignore
/// let ui = MainWindow::new()?;
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), metrics);
/// let handle = bridge.clone_handle();
///
/// ui.on_start_processing(move || {
///     let bridge = handle.clone();
///     handle.spawn_async(move || async move {
///         let result = orchestrator.run(request, RunControl::new()).await;
///         bridge.update_ui(move |ui| ui.set_status_message(summary.into()));
///     });
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge
    ///
    /// This sets up a background handler thread that drains UI update requests
    /// and marshals them to the Slint event loop with `upgrade_in_event_loop`.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let ui_weak = ui.as_weak();
        let (ui_update_tx, mut ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_CAPACITY);

        let ui_weak_clone = ui_weak.clone();
        std::thread::spawn(move || {
            tracing::debug!("EventLoopBridge handler thread started");

            while let Some(update_fn) = ui_update_rx.blocking_recv() {
                // Queues the update to run on Slint's event loop thread
                let result = ui_weak_clone.upgrade_in_event_loop(move |ui| {
                    update_fn(&ui);
                });

                if let Err(e) = result {
                    // The event loop has stopped
                    tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                    break;
                }
            }

            tracing::debug!("EventLoopBridge handler thread terminated");
        });

        Self {
            handle: EventLoopBridgeHandle {
                ui_weak,
                tokio_handle,
                ui_update_tx,
                metrics,
            },
        }
    }

    /// Schedule a UI update from any thread (typically from tokio tasks)
    ///
    /// The update is dropped with a warning if the queue is full.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.handle.update_ui(update);
    }

    /// Spawn an async task on the tokio runtime from a Slint callback
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn_async(future_factory);
    }

    /// Clone the bridge for use in multiple callbacks
    ///
    /// Slint callbacks capture by value, so each one gets its own handle.
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from any thread
    ///
    /// See `EventLoopBridge::update_ui()` for details.
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        queue_update(&self.ui_update_tx, Box::new(update), &self.metrics);
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }

    /// Handle to the runtime the bridge spawns on
    pub fn tokio_handle(&self) -> &tokio::runtime::Handle {
        &self.tokio_handle
    }

    /// Get a weak reference to the UI component
    ///
    /// Only upgrade it on the Slint event loop thread.
    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }
}

/// Try to queue one update; returns `false` if it was dropped.
fn queue_update<U>(tx: &mpsc::Sender<U>, update: U, metrics: &Metrics) -> bool {
    match tx.try_send(update) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            metrics.record_ui_channel_full();
            tracing::warn!("UI update channel full - skipping update to prevent backpressure");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("Failed to send UI update - handler thread has stopped");
            false
        }
    }
}
