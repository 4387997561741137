//! Core contract shared by the egress controller and its observers.
//!
//! This crate defines the connection status model, lifecycle state machine,
//! reconnect policy, status store and the observer delivery bridge.

/// Stable error payload and categories.
pub mod error;
/// Status/log delivery to registered observers.
pub mod observer;
/// Fixed-delay reconnect policy.
pub mod retry;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Process-visible status and generation.
pub mod status;
/// Status, event and log types.
pub mod types;

pub use error::{EgressError, EgressErrorCategory};
pub use observer::{DeliveryQueue, LogObserver, ObserverBridge, StatusObserver};
pub use retry::{DEFAULT_RETRY_DELAY_MS, ReconnectPolicy};
pub use state_machine::{ConnectionStateMachine, LifecycleEvent};
pub use status::StatusStore;
pub use types::{ConnectionStatus, EgressEvent, LogEntry, StatusSnapshot};
