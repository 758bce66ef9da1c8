// UI module - GUI logic and event loop bridge
//
// This module contains:
// - EventLoopBridge: Coordinates between tokio async runtime and Slint event loop
// - Binding: Per-window subscriptions to theme and state broadcasts
// - GuiController: Main controller that wires up the UI with the processing core

pub mod binding;
pub mod bridge;
pub mod controller;

pub use binding::{Binding, bind_state, bind_theme};
pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use controller::GuiController;
