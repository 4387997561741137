use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use tracing::debug;

use crate::{
    error::EgressError,
    observer::ObserverBridge,
    state_machine::{ConnectionStateMachine, LifecycleEvent},
    types::{ConnectionStatus, EgressEvent, StatusSnapshot},
};

#[derive(Debug, Default)]
struct StoreState {
    machine: ConnectionStateMachine,
    generation: u64,
}

/// Current status and its generation, published to observers on every write.
///
/// Writes and the matching dispatch happen under one write lock, so observers
/// see transitions in the order they were applied.
#[derive(Debug)]
pub struct StatusStore {
    state: RwLock<StoreState>,
    bridge: ObserverBridge,
}

impl StatusStore {
    pub fn new(bridge: ObserverBridge) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            bridge,
        }
    }

    pub fn get(&self) -> StatusSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        StatusSnapshot {
            status: state.machine.state(),
            generation: state.generation,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.get().status
    }

    /// Apply a lifecycle event on behalf of `generation` and publish the result.
    ///
    /// Invalid transitions leave the store untouched and publish nothing.
    pub fn apply(
        &self,
        event: LifecycleEvent,
        generation: u64,
    ) -> Result<ConnectionStatus, EgressError> {
        let mut state = self.write_state();
        let mut candidate = state.machine.clone();
        let next = candidate.apply(event)?;
        state.machine = candidate;
        state.generation = generation;
        self.publish(next, generation);
        Ok(next)
    }

    /// Overwrite the pair without transition checks and publish it.
    pub fn set(&self, status: ConnectionStatus, generation: u64) {
        let mut state = self.write_state();
        state.machine = ConnectionStateMachine::with_state(status);
        state.generation = generation;
        self.publish(status, generation);
    }

    fn publish(&self, status: ConnectionStatus, generation: u64) {
        debug!(%status, generation, "status updated");
        self.bridge
            .dispatch(EgressEvent::StatusChanged { status, generation });
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording_store() -> (
        StatusStore,
        crate::observer::DeliveryQueue,
        Arc<Mutex<Vec<ConnectionStatus>>>,
    ) {
        let (bridge, queue) = ObserverBridge::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bridge.set_status_observer(move |status| sink.lock().expect("sink").push(status));
        (StatusStore::new(bridge), queue, seen)
    }

    #[test]
    fn starts_disconnected_at_generation_zero() {
        let (store, _queue, _) = recording_store();
        assert_eq!(store.get(), StatusSnapshot::default());
    }

    #[test]
    fn apply_updates_pair_and_notifies() {
        let (store, mut queue, seen) = recording_store();

        store.apply(LifecycleEvent::Start, 3).expect("start");
        store
            .apply(LifecycleEvent::EngineConnected, 3)
            .expect("connected");

        assert_eq!(
            store.get(),
            StatusSnapshot {
                status: ConnectionStatus::Connected,
                generation: 3
            }
        );
        queue.drain_pending();
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn rejected_transition_publishes_nothing() {
        let (store, mut queue, seen) = recording_store();

        store
            .apply(LifecycleEvent::EngineConnected, 1)
            .expect_err("connected without start must fail");

        assert_eq!(store.get(), StatusSnapshot::default());
        assert_eq!(queue.drain_pending(), 0);
        assert!(seen.lock().expect("seen").is_empty());
    }

    #[test]
    fn set_overwrites_without_checks() {
        let (store, mut queue, seen) = recording_store();
        store.set(ConnectionStatus::Error, 7);
        assert_eq!(store.status(), ConnectionStatus::Error);
        assert_eq!(store.get().generation, 7);

        store
            .apply(LifecycleEvent::RetryFired, 7)
            .expect("retry from error");
        queue.drain_pending();
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![ConnectionStatus::Error, ConnectionStatus::Connecting]
        );
    }

    #[test]
    fn concurrent_readers_never_see_torn_pairs() {
        let (bridge, _queue) = ObserverBridge::new();
        let store = Arc::new(StatusStore::new(bridge));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for generation in 1..=500_u64 {
                    let status = if generation % 2 == 0 {
                        ConnectionStatus::Connected
                    } else {
                        ConnectionStatus::Error
                    };
                    store.set(status, generation);
                }
            })
        };

        for _ in 0..2_000 {
            let snapshot = store.get();
            match snapshot.status {
                ConnectionStatus::Connected => assert_eq!(snapshot.generation % 2, 0),
                ConnectionStatus::Error => assert_eq!(snapshot.generation % 2, 1),
                ConnectionStatus::Disconnected => assert_eq!(snapshot.generation, 0),
                ConnectionStatus::Connecting => panic!("never written"),
            }
        }
        writer.join().expect("writer thread");
    }
}
