// Window bindings - keep a window in sync with the theme and the app state
//
// Each binding is a tokio task that forwards broadcast events to one window
// through its bridge. Dropping the returned `Binding` stops the task and
// releases the subscription.

use crate::state::{StateChange, StateManager};
use crate::theme::{ThemeState, ThemeUpdate};
use crate::ui::bridge::EventLoopBridgeHandle;
use slint::ComponentHandle;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Guard for a running binding.
pub struct Binding {
    _stop: oneshot::Sender<()>,
}

/// Apply every theme update to the window behind `bridge`.
///
/// The current theme is not replayed; apply [`ThemeState::is_dark`] yourself
/// when the window is created.
pub fn bind_theme<T, F>(bridge: &EventLoopBridgeHandle<T>, theme: &ThemeState, apply: F) -> Binding
where
    T: ComponentHandle + 'static,
    F: Fn(&T, ThemeUpdate) + Send + Sync + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut subscription = theme.subscribe();
    let apply = Arc::new(apply);
    let bridge = bridge.clone();
    let runtime = bridge.tokio_handle().clone();

    runtime.spawn(async move {
        loop {
            tokio::select! {
                update = subscription.recv() => match update {
                    Some(update) => {
                        let apply = Arc::clone(&apply);
                        bridge.update_ui(move |ui| apply(ui, update));
                    }
                    None => break,
                },
                _ = &mut stop_rx => break,
            }
        }

        subscription.unsubscribe();
        tracing::debug!("Theme binding detached");
    });

    Binding { _stop: stop_tx }
}

/// Hand every state change to `on_change`, which runs on a tokio worker and
/// decides what to push to the window.
pub fn bind_state<T, F>(bridge: &EventLoopBridgeHandle<T>, state: &StateManager, on_change: F) -> Binding
where
    T: ComponentHandle + 'static,
    F: Fn(&EventLoopBridgeHandle<T>, StateChange) + Send + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut rx = state.subscribe();
    let bridge = bridge.clone();
    let runtime = bridge.tokio_handle().clone();

    runtime.spawn(async move {
        loop {
            tokio::select! {
                change = rx.recv() => match change {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        on_change(&bridge, change);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("State broadcast channel closed - stopping binding");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Recoverable; console text is re-read from state on the next chunk
                        tracing::warn!(
                            "State subscription lagged - {} events were skipped",
                            skipped
                        );
                    }
                },
                _ = &mut stop_rx => break,
            }
        }

        tracing::debug!("State binding detached");
    });

    Binding { _stop: stop_tx }
}
