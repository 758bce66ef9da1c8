// Theme state
//
// Owns the light/dark preference and broadcasts the effective theme to every
// window that subscribed.

use crate::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Buffered theme updates per subscriber before it starts lagging
const THEME_CHANNEL_CAPACITY: usize = 16;

/// Theme the user asked for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    /// Follow the OS setting
    #[default]
    System,
    Light,
    Dark,
}

impl ThemePreference {
    /// Resolve against the OS setting.
    pub fn is_dark(self, system_is_dark: bool) -> bool {
        match self {
            ThemePreference::System => system_is_dark,
            ThemePreference::Light => false,
            ThemePreference::Dark => true,
        }
    }

    /// Name shown in the theme selector.
    pub fn label(self) -> &'static str {
        match self {
            ThemePreference::System => "System",
            ThemePreference::Light => "Light",
            ThemePreference::Dark => "Dark",
        }
    }

    /// Parse a [`label`](Self::label), ignoring case.
    pub fn from_label(label: &str) -> Option<Self> {
        [ThemePreference::System, ThemePreference::Light, ThemePreference::Dark]
            .into_iter()
            .find(|pref| pref.label().eq_ignore_ascii_case(label.trim()))
    }
}

/// Broadcast after every preference change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThemeUpdate {
    pub preference: ThemePreference,
    pub is_dark: bool,
}

#[derive(Debug)]
struct ThemeInner {
    preference: ThemePreference,
    system_is_dark: bool,
}

/// Shared theme preference with change broadcast.
///
/// One instance is created at startup and cloned into whatever needs it;
/// clones share the same preference and channel. Notification is
/// fire-and-forget: a subscriber only sees updates sent after it subscribed,
/// so a late window should call [`is_dark`](Self::is_dark) to catch up.
#[derive(Clone)]
pub struct ThemeState {
    inner: Arc<RwLock<ThemeInner>>,
    theme_tx: broadcast::Sender<ThemeUpdate>,
    metrics: Option<Arc<Metrics>>,
}

impl ThemeState {
    /// Start with [`ThemePreference::System`] and the given OS setting.
    pub fn new(system_is_dark: bool) -> Self {
        let (theme_tx, _) = broadcast::channel(THEME_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(ThemeInner {
                preference: ThemePreference::System,
                system_is_dark,
            })),
            theme_tx,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn preference(&self) -> ThemePreference {
        self.read().preference
    }

    /// Effective dark state. No side effects.
    pub fn is_dark(&self) -> bool {
        let inner = self.read();
        inner.preference.is_dark(inner.system_is_dark)
    }

    /// Set the preference and return the effective dark state.
    ///
    /// Always broadcasts, even if the value did not change.
    pub fn set_preference(&self, preference: ThemePreference) -> bool {
        self.apply_preference(|_| preference)
    }

    /// Flip between light and dark based on what is currently shown.
    ///
    /// Never lands on [`ThemePreference::System`].
    pub fn toggle(&self) -> bool {
        self.apply_preference(|inner| {
            if inner.preference.is_dark(inner.system_is_dark) {
                ThemePreference::Light
            } else {
                ThemePreference::Dark
            }
        })
    }

    /// Go back to following the OS. Still broadcasts.
    pub fn reset_to_system(&self) {
        self.set_preference(ThemePreference::System);
    }

    /// Record the OS setting reported by the platform.
    ///
    /// Broadcasts only when following the OS and the effective theme changed.
    pub fn set_system_is_dark(&self, system_is_dark: bool) {
        let mut inner = self.write();
        let was_dark = inner.preference.is_dark(inner.system_is_dark);
        inner.system_is_dark = system_is_dark;
        let is_dark = inner.preference.is_dark(system_is_dark);

        if inner.preference == ThemePreference::System && was_dark != is_dark {
            tracing::debug!("OS theme changed (dark: {})", is_dark);
            self.broadcast(ThemeUpdate {
                preference: inner.preference,
                is_dark,
            });
        }
    }

    /// Pick and store a preference, then broadcast it.
    ///
    /// The write guard is held until the update is sent, so subscribers see
    /// updates in the order the preference was changed.
    fn apply_preference<F>(&self, choose: F) -> bool
    where
        F: FnOnce(&ThemeInner) -> ThemePreference,
    {
        let mut inner = self.write();
        let preference = choose(&inner);
        inner.preference = preference;
        let update = ThemeUpdate {
            preference,
            is_dark: preference.is_dark(inner.system_is_dark),
        };

        tracing::info!(
            "Theme preference set to {:?} (dark: {})",
            update.preference,
            update.is_dark
        );
        self.broadcast(update);
        update.is_dark
    }

    /// Register an observer. Drop the subscription or call
    /// [`ThemeSubscription::unsubscribe`] to detach.
    pub fn subscribe(&self) -> ThemeSubscription {
        ThemeSubscription {
            theme_rx: self.theme_tx.subscribe(),
        }
    }

    /// Number of attached observers
    pub fn subscriber_count(&self) -> usize {
        self.theme_tx.receiver_count()
    }

    fn broadcast(&self, update: ThemeUpdate) {
        // Ignore send errors - it's OK if no window is listening
        let _ = self.theme_tx.send(update);
        if let Some(metrics) = &self.metrics {
            metrics.record_theme_broadcast();
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ThemeInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ThemeInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ThemeState {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Receiving end of theme updates for one observer.
pub struct ThemeSubscription {
    theme_rx: broadcast::Receiver<ThemeUpdate>,
}

impl ThemeSubscription {
    /// Wait for the next update. `None` once every [`ThemeState`] is gone.
    pub async fn recv(&mut self) -> Option<ThemeUpdate> {
        loop {
            match self.theme_rx.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Theme subscriber lagged - {} updates skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant for listener threads outside the runtime.
    pub fn blocking_recv(&mut self) -> Option<ThemeUpdate> {
        loop {
            match self.theme_rx.blocking_recv() {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Theme subscriber lagged - {} updates skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an update if one is already queued.
    pub fn try_recv(&mut self) -> Option<ThemeUpdate> {
        loop {
            match self.theme_rx.try_recv() {
                Ok(update) => return Some(update),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Detach from the broadcaster.
    pub fn unsubscribe(self) {
        drop(self.theme_rx);
    }
}
