use std::time::Duration;

use crate::types::ConnectionStatus;

/// Default pause between an unsolicited drop and the next connect attempt.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Fixed-delay, unbounded reconnect policy.
///
/// A retry is due only for an unsolicited drop: the session was not asked to
/// stop and the status at disconnect time is `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn should_retry(&self, status: ConnectionStatus, stop_requested: bool) -> Option<Duration> {
        if stop_requested || status != ConnectionStatus::Error {
            return None;
        }
        Some(self.delay())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY_MS)
    }
}
