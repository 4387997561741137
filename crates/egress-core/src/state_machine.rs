use crate::{error::EgressError, types::ConnectionStatus};

/// Inputs that move the connection through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Caller asked for a new session.
    Start,
    /// Engine reported an established session.
    EngineConnected,
    /// Engine dropped the session or a connect call failed.
    EngineDropped,
    /// Engine provider could not produce a transport handle.
    EngineUnavailable,
    /// A scheduled reconnect fired.
    RetryFired,
    /// Caller asked to tear the session down.
    Stop,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::EngineConnected => "engine_connected",
            Self::EngineDropped => "engine_dropped",
            Self::EngineUnavailable => "engine_unavailable",
            Self::RetryFired => "retry_fired",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionStatus,
}

impl ConnectionStateMachine {
    pub fn with_state(state: ConnectionStatus) -> Self {
        Self { state }
    }

    pub fn state(&self) -> ConnectionStatus {
        self.state
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> Result<ConnectionStatus, EgressError> {
        use ConnectionStatus::*;
        use LifecycleEvent::*;

        match event {
            // `Error` is accepted so a session-less failed start can be retried
            // explicitly; the controller rejects `Start` while a session exists.
            Start => self.transition_from_any_of(&[Disconnected, Error], Connecting, event),
            EngineConnected => self.transition_from_any_of(&[Connecting], Connected, event),
            EngineDropped => self.transition_from_any_of(&[Connecting, Connected], Error, event),
            EngineUnavailable => self.transition_from_any_of(&[Connecting], Error, event),
            RetryFired => self.transition_from_any_of(&[Error], Connecting, event),
            Stop => {
                self.state = Disconnected;
                Ok(Disconnected)
            }
        }
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ConnectionStatus],
        next: ConnectionStatus,
        event: LifecycleEvent,
    ) -> Result<ConnectionStatus, EgressError> {
        if !expected.contains(&self.state) {
            return Err(EgressError::invalid_state(self.state, event.as_str()));
        }
        self.state = next;
        Ok(next)
    }
}
