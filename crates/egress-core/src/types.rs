use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of the single egress connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No session is active; the initial state and the state after `stop`.
    #[default]
    Disconnected,
    /// A connect call was issued and the engine has not reported back yet.
    Connecting,
    /// The engine reported an established session.
    Connected,
    /// The session dropped or failed; an automatic reconnect may be pending.
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status paired with the generation of the session it belongs to.
///
/// Generation `0` means no `start` has happened yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub generation: u64,
}

/// Event routed from the controller to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EgressEvent {
    /// The controller applied a status transition.
    StatusChanged {
        status: ConnectionStatus,
        generation: u64,
    },
    /// A diagnostic line from the engine or the controller.
    Log { line: String },
}

/// Log line as handed to the log observer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch, stamped at delivery time.
    pub timestamp_ms: u64,
    pub line: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp_ms, self.line)
    }
}
