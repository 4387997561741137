//! Scripted engine and status probe shared by unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use egress_core::{ConnectionStatus, ObserverBridge};
use egress_platform::EngineBuildInfo;
use tokio::sync::mpsc;

use crate::engine::{
    ConnectRequest, ConnectionEngine, EngineCallbacks, EngineError, EngineProvider, EventCallback,
    LogCallback,
};

#[derive(Default)]
struct LiveCounter {
    live: AtomicUsize,
    max_live: AtomicUsize,
}

pub(crate) struct FakeEngine {
    callbacks: EngineCallbacks,
    stale_disconnected: Mutex<Option<EventCallback>>,
    requests: Mutex<Vec<ConnectRequest>>,
    disconnects: AtomicUsize,
    unregistered: AtomicBool,
    fail_connects: AtomicBool,
    connect_synchronously: bool,
    counter: Arc<LiveCounter>,
}

impl FakeEngine {
    pub(crate) fn fire_connected(&self) {
        self.callbacks.emit_connected();
    }

    pub(crate) fn fire_disconnected(&self) {
        self.callbacks.emit_disconnected();
    }

    /// Fire the disconnect callback even if it was unregistered since.
    pub(crate) fn fire_stale_disconnected(&self) {
        let callback = self.stale_disconnected.lock().expect("stale slot").clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub(crate) fn fire_log(&self, line: &str) {
        self.callbacks.emit_log(line);
    }

    pub(crate) fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }

    pub(crate) fn last_request(&self) -> Option<ConnectRequest> {
        self.requests.lock().expect("requests").last().cloned()
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::SeqCst)
    }
}

impl ConnectionEngine for FakeEngine {
    fn connect(&self, request: &ConnectRequest) -> Result<(), EngineError> {
        self.requests
            .lock()
            .expect("requests")
            .push(request.clone());
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(EngineError::Connect("scripted failure".to_owned()));
        }
        if self.connect_synchronously {
            self.callbacks.emit_connected();
        }
        Ok(())
    }

    fn disconnect(&self) {
        if self.disconnects.fetch_add(1, Ordering::SeqCst) == 0 {
            self.counter.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn register_on_log(&self, callback: LogCallback) {
        self.callbacks.set_log(callback);
    }

    fn register_on_connected(&self, callback: EventCallback) {
        self.callbacks.set_connected(callback);
    }

    fn register_on_disconnected(&self, callback: EventCallback) {
        *self.stale_disconnected.lock().expect("stale slot") = Some(Arc::clone(&callback));
        self.callbacks.set_disconnected(callback);
    }

    fn unregister_on_disconnected(&self) {
        self.unregistered.store(true, Ordering::SeqCst);
        self.callbacks.clear_disconnected();
    }
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    engines: Mutex<Vec<Arc<FakeEngine>>>,
    fail_next_create: AtomicBool,
    fail_connects: AtomicBool,
    connect_synchronously: AtomicBool,
    counter: Arc<LiveCounter>,
}

impl FakeProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_connects_on_new_engines(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn connect_synchronously(&self, enabled: bool) {
        self.connect_synchronously.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn created(&self) -> usize {
        self.engines.lock().expect("engines").len()
    }

    pub(crate) fn latest(&self) -> Arc<FakeEngine> {
        self.engines
            .lock()
            .expect("engines")
            .last()
            .cloned()
            .expect("an engine was created")
    }

    pub(crate) fn live_engines(&self) -> usize {
        self.counter.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live_engines(&self) -> usize {
        self.counter.max_live.load(Ordering::SeqCst)
    }
}

impl EngineProvider for FakeProvider {
    fn create(&self, _info: &EngineBuildInfo) -> Result<Arc<dyn ConnectionEngine>, EngineError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Unavailable("native library missing".to_owned()));
        }

        let live = self.counter.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counter.max_live.fetch_max(live, Ordering::SeqCst);

        let engine = Arc::new(FakeEngine {
            callbacks: EngineCallbacks::default(),
            stale_disconnected: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
            unregistered: AtomicBool::new(false),
            fail_connects: AtomicBool::new(self.fail_connects.load(Ordering::SeqCst)),
            connect_synchronously: self.connect_synchronously.load(Ordering::SeqCst),
            counter: Arc::clone(&self.counter),
        });
        self.engines
            .lock()
            .expect("engines")
            .push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// Status observer feeding a channel the test can await.
pub(crate) struct StatusProbe {
    rx: mpsc::UnboundedReceiver<ConnectionStatus>,
}

impl StatusProbe {
    pub(crate) fn attach(bridge: &ObserverBridge) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        bridge.set_status_observer(move |status| {
            let _ = tx.send(status);
        });
        Self { rx }
    }

    pub(crate) async fn next(&mut self) -> ConnectionStatus {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("status timeout")
            .expect("status channel open")
    }

    pub(crate) async fn collect(&mut self, count: usize) -> Vec<ConnectionStatus> {
        let mut statuses = Vec::with_capacity(count);
        for _ in 0..count {
            statuses.push(self.next().await);
        }
        statuses
    }

    /// Let pending deliveries run without moving the clock, then require
    /// that nothing arrived.
    pub(crate) async fn assert_quiet(&mut self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        if let Ok(status) = self.rx.try_recv() {
            panic!("unexpected status notification: {status}");
        }
    }
}
