use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, trace};

use crate::types::{ConnectionStatus, EgressEvent, LogEntry};

/// Callback invoked with every applied status transition.
pub type StatusObserver = Arc<dyn Fn(ConnectionStatus) + Send + Sync + 'static>;
/// Callback invoked with every log line.
pub type LogObserver = Arc<dyn Fn(LogEntry) + Send + Sync + 'static>;

#[derive(Default)]
struct Observers {
    status: Option<StatusObserver>,
    log: Option<LogObserver>,
}

/// Producer side of observer delivery.
///
/// `dispatch` only enqueues; the paired [`DeliveryQueue`] invokes observers in
/// FIFO order on whatever context drives it. Observers are looked up at
/// delivery time, so replacing or clearing them never replays or loses queued
/// events for the new registration.
#[derive(Clone)]
pub struct ObserverBridge {
    event_tx: mpsc::UnboundedSender<EgressEvent>,
    observers: Arc<RwLock<Observers>>,
}

/// Consumer side of observer delivery: the single designated delivery context.
pub struct DeliveryQueue {
    event_rx: mpsc::UnboundedReceiver<EgressEvent>,
    observers: Arc<RwLock<Observers>>,
}

impl ObserverBridge {
    /// Create a bridge and the queue that must be driven to deliver events.
    pub fn new() -> (Self, DeliveryQueue) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let observers = Arc::new(RwLock::new(Observers::default()));

        (
            Self {
                event_tx,
                observers: Arc::clone(&observers),
            },
            DeliveryQueue {
                event_rx,
                observers,
            },
        )
    }

    /// Create a bridge whose queue runs as a dedicated task on `handle`.
    pub fn spawn(handle: &Handle) -> Self {
        let (bridge, queue) = Self::new();
        handle.spawn(queue.run());
        bridge
    }

    pub fn set_status_observer<F>(&self, observer: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.write_observers().status = Some(Arc::new(observer));
    }

    pub fn set_log_observer<F>(&self, observer: F)
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        self.write_observers().log = Some(Arc::new(observer));
    }

    /// Remove both observers. Queued events are dropped at delivery time.
    pub fn clear_all(&self) {
        let mut observers = self.write_observers();
        observers.status = None;
        observers.log = None;
    }

    /// Enqueue an event without waiting for delivery.
    ///
    /// Emission is best-effort; once the delivery queue is gone events are
    /// discarded.
    pub fn dispatch(&self, event: EgressEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("delivery queue closed; dropping observer event");
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        self.dispatch(EgressEvent::Log { line: line.into() });
    }

    fn write_observers(&self) -> std::sync::RwLockWriteGuard<'_, Observers> {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObserverBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBridge")
            .field("closed", &self.event_tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl DeliveryQueue {
    /// Deliver events until every [`ObserverBridge`] clone is dropped.
    pub async fn run(mut self) {
        debug!("observer delivery started");
        while let Some(event) = self.event_rx.recv().await {
            self.deliver(event);
        }
        debug!("observer delivery exiting");
    }

    /// Deliver everything queued so far without waiting. Returns the number of
    /// events taken off the queue.
    ///
    /// Meant for hosts that pump delivery from their own event loop.
    pub fn drain_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    fn deliver(&self, event: EgressEvent) {
        // Clone the callback out so observers may re-register from inside it.
        match event {
            EgressEvent::StatusChanged { status, .. } => {
                let observer = self.read_observers().status.clone();
                if let Some(observer) = observer {
                    observer(status);
                }
            }
            EgressEvent::Log { line } => {
                let observer = self.read_observers().log.clone();
                if let Some(observer) = observer {
                    observer(LogEntry {
                        timestamp_ms: now_ms(),
                        line,
                    });
                }
            }
        }
    }

    fn read_observers(&self) -> std::sync::RwLockReadGuard<'_, Observers> {
        self.observers.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
