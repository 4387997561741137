//! Connection lifecycle runtime for the egress proxy.
//!
//! The [`ConnectionController`] drives an external [`ConnectionEngine`]
//! through start/stop and automatic reconnects; [`EgressSdk`] wraps it with
//! one-time configuration for background-service callers.

/// Connection controller and endpoint configuration.
pub mod controller;
/// Engine contract consumed by the controller.
pub mod engine;
/// Caller-facing facade.
pub mod sdk;

#[cfg(test)]
mod test_support;

pub use controller::{
    BACKEND_HOST, BACKEND_PORT, ConnectionController, ControllerConfig, SessionCredentials,
};
pub use engine::{
    ConnectRequest, ConnectionEngine, EngineCallbacks, EngineError, EngineProvider, EventCallback,
    LogCallback,
};
pub use sdk::EgressSdk;
