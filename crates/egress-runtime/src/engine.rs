//! Narrow contract to the external proxy transport.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use egress_platform::EngineBuildInfo;
use thiserror::Error;

/// Callback receiving one diagnostic line from the engine.
pub type LogCallback = Arc<dyn Fn(String) + Send + Sync + 'static>;
/// Callback for connected/disconnected notifications.
pub type EventCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Parameters for one engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub device_id: String,
    /// Identity presented to the backend (the client key).
    pub identity: String,
    pub share_bandwidth: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The provider could not build a transport handle.
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    /// The connect call failed before any callback fired.
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Opaque transport performing the real network session.
///
/// `connect` must not block on network completion; the outcome arrives later
/// through the registered callbacks. Callback registration replaces any
/// previous callback of the same kind.
pub trait ConnectionEngine: Send + Sync {
    fn connect(&self, request: &ConnectRequest) -> Result<(), EngineError>;

    /// Tear the session down. Must be idempotent.
    fn disconnect(&self);

    fn register_on_log(&self, callback: LogCallback);

    fn register_on_connected(&self, callback: EventCallback);

    fn register_on_disconnected(&self, callback: EventCallback);

    fn unregister_on_disconnected(&self);
}

/// Factory producing a fresh engine handle for each started session.
pub trait EngineProvider: Send + Sync {
    fn create(&self, info: &EngineBuildInfo) -> Result<Arc<dyn ConnectionEngine>, EngineError>;
}

/// Callback slots for engine implementations.
#[derive(Default)]
pub struct EngineCallbacks {
    log: RwLock<Option<LogCallback>>,
    connected: RwLock<Option<EventCallback>>,
    disconnected: RwLock<Option<EventCallback>>,
}

impl EngineCallbacks {
    pub fn set_log(&self, callback: LogCallback) {
        *self.log.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn set_connected(&self, callback: EventCallback) {
        *self.connected.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn set_disconnected(&self, callback: EventCallback) {
        *self
            .disconnected
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_disconnected(&self) {
        *self
            .disconnected
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn emit_log(&self, line: impl Into<String>) {
        let callback = self
            .log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(line.into());
        }
    }

    pub fn emit_connected(&self) {
        Self::emit(&self.connected);
    }

    pub fn emit_disconnected(&self) {
        Self::emit(&self.disconnected);
    }

    fn emit(slot: &RwLock<Option<EventCallback>>) {
        // Invoke outside the lock so callbacks may re-register.
        let callback = slot.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl fmt::Debug for EngineCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let is_set = |present: bool| if present { "set" } else { "empty" };
        f.debug_struct("EngineCallbacks")
            .field(
                "log",
                &is_set(self.log.read().map(|slot| slot.is_some()).unwrap_or(false)),
            )
            .field(
                "connected",
                &is_set(
                    self.connected
                        .read()
                        .map(|slot| slot.is_some())
                        .unwrap_or(false),
                ),
            )
            .field(
                "disconnected",
                &is_set(
                    self.disconnected
                        .read()
                        .map(|slot| slot.is_some())
                        .unwrap_or(false),
                ),
            )
            .finish()
    }
}
