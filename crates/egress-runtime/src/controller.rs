//! Connection lifecycle controller.
//!
//! Owns the single engine session, serializes start/stop/retry through one
//! operation lock, and gates every engine callback on the generation it was
//! registered for. Engine calls are made without holding the state lock so an
//! engine may fire callbacks synchronously.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use egress_core::{
    ConnectionStatus, EgressError, LifecycleEvent, ObserverBridge, ReconnectPolicy,
    StatusSnapshot, StatusStore,
};
use egress_platform::EngineBuildInfo;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::engine::{ConnectRequest, ConnectionEngine, EngineProvider};

/// Backend coordination endpoint.
pub const BACKEND_HOST: &str = "mobile-socket.culturegps.com";
pub const BACKEND_PORT: u16 = 443;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    pub retry_policy: ReconnectPolicy,
    pub share_bandwidth: bool,
    /// Metadata passed to the engine provider on every `start`.
    pub build_info: EngineBuildInfo,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: BACKEND_HOST.to_owned(),
            port: BACKEND_PORT,
            retry_policy: ReconnectPolicy::default(),
            share_bandwidth: true,
            build_info: EngineBuildInfo::current(),
        }
    }
}

/// Credentials a session connects with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub client_key: String,
    pub device_id: String,
    pub username: String,
}

struct Session {
    generation: u64,
    credentials: SessionCredentials,
    engine: Arc<dyn ConnectionEngine>,
    stop_requested: bool,
}

struct PendingRetry {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ControllerState {
    last_generation: u64,
    session: Option<Session>,
    retry: Option<PendingRetry>,
}

impl ControllerState {
    /// The session `generation` refers to, unless it was superseded or stopped.
    fn live_session(&self, generation: u64) -> Option<&Session> {
        self.session
            .as_ref()
            .filter(|session| session.generation == generation && !session.stop_requested)
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            trace!(generation = retry.generation, "cancelling pending reconnect");
            retry.cancel.cancel();
        }
    }
}

struct ControllerInner {
    config: ControllerConfig,
    provider: Arc<dyn EngineProvider>,
    runtime: Handle,
    bridge: ObserverBridge,
    status: StatusStore,
    ops: Mutex<()>,
    state: Mutex<ControllerState>,
}

/// Owner of the single logical egress connection.
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

impl ConnectionController {
    /// Build a controller. Reconnect timers are spawned on `runtime`.
    pub fn new(
        config: ControllerConfig,
        provider: Arc<dyn EngineProvider>,
        bridge: ObserverBridge,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                provider,
                runtime,
                status: StatusStore::new(bridge.clone()),
                bridge,
                ops: Mutex::new(()),
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Start a session. Returns `false` when one is already running or the
    /// engine could not be created.
    pub fn start(
        &self,
        client_key: impl Into<String>,
        device_id: impl Into<String>,
        username: impl Into<String>,
    ) -> bool {
        let credentials = SessionCredentials {
            client_key: client_key.into(),
            device_id: device_id.into(),
            username: username.into(),
        };
        match self.try_start(credentials) {
            Ok(_) => true,
            Err(err) => {
                debug!(code = %err.code, "start rejected");
                false
            }
        }
    }

    /// Start a session and return its generation.
    pub fn try_start(&self, credentials: SessionCredentials) -> Result<u64, EgressError> {
        self.inner.start(credentials)
    }

    /// Tear the current session down. No-op when nothing is running.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.status()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.status.get()
    }

    /// Whether a session is active and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.inner
            .lock_state()
            .session
            .as_ref()
            .is_some_and(|session| !session.stop_requested)
    }

    pub fn bridge(&self) -> &ObserverBridge {
        &self.inner.bridge
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }
}

impl ControllerInner {
    fn start(self: &Arc<Self>, credentials: SessionCredentials) -> Result<u64, EgressError> {
        let _ops = self.lock_ops();

        let generation = {
            let mut state = self.lock_state();
            if state.session.is_some() {
                let current = self.status.status();
                debug!(%current, "proxy already running");
                return Err(EgressError::already_running(current));
            }
            state.cancel_retry();
            let generation = state.last_generation + 1;
            self.status.apply(LifecycleEvent::Start, generation)?;
            state.last_generation = generation;
            generation
        };

        info!(
            generation,
            client_key = %prefix(&credentials.client_key, 6),
            "starting proxy"
        );

        let engine = match self.provider.create(&self.config.build_info) {
            Ok(engine) => engine,
            Err(err) => {
                error!(generation, error = %err, "failed to create proxy engine");
                let _state = self.lock_state();
                if let Err(transition) =
                    self.status.apply(LifecycleEvent::EngineUnavailable, generation)
                {
                    warn!(error = %transition, "engine failure transition rejected");
                }
                self.bridge.log(format!("Failed to create proxy engine: {err}"));
                return Err(EgressError::engine_unavailable(err.to_string()));
            }
        };

        self.register_callbacks(&engine, generation);
        self.lock_state().session = Some(Session {
            generation,
            credentials,
            engine,
            stop_requested: false,
        });

        self.connect(generation);
        Ok(generation)
    }

    fn stop(self: &Arc<Self>) {
        let _ops = self.lock_ops();

        let target = {
            let mut state = self.lock_state();
            state.cancel_retry();
            state.session.as_mut().map(|session| {
                session.stop_requested = true;
                (session.generation, Arc::clone(&session.engine))
            })
        };

        let Some((generation, engine)) = target else {
            let snapshot = self.status.get();
            if snapshot.status == ConnectionStatus::Disconnected {
                debug!("stop ignored; proxy not running");
                return;
            }
            // A start whose engine could not be created leaves `Error` behind.
            let _state = self.lock_state();
            if let Err(err) = self.status.apply(LifecycleEvent::Stop, snapshot.generation) {
                warn!(error = %err, "stop transition rejected");
            }
            return;
        };

        info!(generation, "stopping proxy");
        engine.unregister_on_disconnected();
        engine.disconnect();

        let mut state = self.lock_state();
        state.session = None;
        if let Err(err) = self.status.apply(LifecycleEvent::Stop, generation) {
            warn!(error = %err, "stop transition rejected");
        }
    }

    fn register_callbacks(self: &Arc<Self>, engine: &Arc<dyn ConnectionEngine>, generation: u64) {
        let bridge = self.bridge.clone();
        engine.register_on_log(Arc::new(move |line: String| {
            debug!(target: "egress_runtime::engine", "{line}");
            bridge.log(line);
        }));

        let weak = Arc::downgrade(self);
        engine.register_on_connected(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_connected(generation);
            }
        }));

        let weak = Arc::downgrade(self);
        engine.register_on_disconnected(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_drop(generation, EgressError::transport("engine disconnected"));
            }
        }));
    }

    /// Issue the engine connect call for `generation`. Caller holds `ops`.
    fn connect(self: &Arc<Self>, generation: u64) {
        let target = {
            let state = self.lock_state();
            state.live_session(generation).map(|session| {
                let request = ConnectRequest {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    device_id: session.credentials.device_id.clone(),
                    identity: session.credentials.username.clone(),
                    share_bandwidth: self.config.share_bandwidth,
                };
                (Arc::clone(&session.engine), request)
            })
        };
        let Some((engine, request)) = target else {
            trace!(generation, "connect skipped; session no longer live");
            return;
        };

        debug!(
            generation,
            host = %request.host,
            port = request.port,
            device_id = %prefix(&request.device_id, 8),
            "connecting to proxy backend"
        );
        if let Err(err) = engine.connect(&request) {
            error!(generation, error = %err, "failed to connect to proxy backend");
            self.handle_drop(generation, EgressError::transport(err.to_string()));
        }
    }

    fn handle_connected(&self, generation: u64) {
        let state = self.lock_state();
        if state.live_session(generation).is_none() {
            debug!(generation, "ignoring connected callback from stale session");
            return;
        }
        match self.status.apply(LifecycleEvent::EngineConnected, generation) {
            Ok(_) => info!(generation, "proxy connected"),
            Err(err) => debug!(generation, error = %err, "ignoring connected callback"),
        }
    }

    fn handle_drop(self: &Arc<Self>, generation: u64, reason: EgressError) {
        let mut state = self.lock_state();
        let Some(session) = state.live_session(generation) else {
            debug!(generation, "ignoring disconnect from stale or stopped session");
            return;
        };
        let stop_requested = session.stop_requested;

        let status = match self.status.apply(LifecycleEvent::EngineDropped, generation) {
            Ok(status) => status,
            Err(err) => {
                debug!(generation, error = %err, "ignoring duplicate disconnect");
                return;
            }
        };
        warn!(generation, reason = %reason.message, "proxy disconnected unexpectedly");

        if let Some(delay) = self.config.retry_policy.should_retry(status, stop_requested) {
            self.schedule_retry(&mut state, generation, delay);
        }
    }

    fn schedule_retry(self: &Arc<Self>, state: &mut ControllerState, generation: u64, delay: Duration) {
        state.cancel_retry();
        let cancel = CancellationToken::new();
        state.retry = Some(PendingRetry {
            generation,
            cancel: cancel.clone(),
        });

        info!(generation, delay_ms = delay.as_millis() as u64, "will attempt reconnect");
        self.bridge.log(format!(
            "Connection lost. Reconnecting in {} seconds...",
            delay.as_secs()
        ));

        let weak: Weak<Self> = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_retry(generation);
                    }
                }
            }
        });
    }

    fn fire_retry(self: &Arc<Self>, generation: u64) {
        let _ops = self.lock_ops();
        {
            let mut state = self.lock_state();
            if state
                .retry
                .as_ref()
                .is_some_and(|retry| retry.generation == generation)
            {
                state.retry = None;
            }
            if state.live_session(generation).is_none() {
                debug!(generation, "discarding reconnect for superseded session");
                return;
            }
            if self.status.status() != ConnectionStatus::Error {
                debug!(generation, "discarding reconnect; session recovered");
                return;
            }
            if let Err(err) = self.status.apply(LifecycleEvent::RetryFired, generation) {
                warn!(generation, error = %err, "reconnect transition rejected");
                return;
            }
        }

        info!(generation, "attempting reconnect");
        self.connect(generation);
    }

    fn lock_ops(&self) -> MutexGuard<'_, ()> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cancel_retry();
        if let Some(session) = state.session.take() {
            debug!(generation = session.generation, "controller dropped; tearing down engine");
            session.engine.unregister_on_disconnected();
            session.engine.disconnect();
        }
    }
}

/// Leading `len` characters of a credential, for logs.
pub(crate) fn prefix(value: &str, len: usize) -> &str {
    value
        .char_indices()
        .nth(len)
        .map_or(value, |(end, _)| &value[..end])
}
