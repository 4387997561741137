use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionStatus;

/// Broad error category used for logging and reconnect decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EgressErrorCategory {
    /// Missing or invalid configuration (not initialized, blank client key).
    Config,
    /// A session is already active.
    AlreadyRunning,
    /// The engine provider could not produce a transport handle.
    Engine,
    /// The engine failed while connecting or dropped the session.
    Transport,
    /// Invariant break inside the controller.
    Internal,
}

/// Stable error payload produced by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct EgressError {
    /// High-level error category.
    pub category: EgressErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl EgressError {
    pub fn new(
        category: EgressErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_initialized() -> Self {
        Self::new(
            EgressErrorCategory::Config,
            "not_initialized",
            "sdk not initialized; call initialize() first",
        )
    }

    pub fn empty_client_key() -> Self {
        Self::new(
            EgressErrorCategory::Config,
            "empty_client_key",
            "client key is empty; provide a valid client key in initialize()",
        )
    }

    pub fn already_running(current: ConnectionStatus) -> Self {
        Self::new(
            EgressErrorCategory::AlreadyRunning,
            "already_running",
            format!("a session is already active (status {current})"),
        )
    }

    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::new(EgressErrorCategory::Engine, "engine_unavailable", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(EgressErrorCategory::Transport, "transport_failure", message)
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionStatus, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            EgressErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot apply '{action}' while connection is {current}"),
        )
    }

    /// Whether this failure feeds the reconnect policy.
    pub fn is_transport(&self) -> bool {
        self.category == EgressErrorCategory::Transport
    }
}
