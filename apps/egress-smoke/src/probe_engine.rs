//! Engine that only checks reachability of the backend over TCP.
//!
//! It opens a plain TCP connection to the configured endpoint, reports
//! connected once it is established and disconnected when the peer closes or
//! the socket fails. No proxy traffic is exchanged.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use egress_platform::EngineBuildInfo;
use egress_runtime::{
    ConnectRequest, ConnectionEngine, EngineCallbacks, EngineError, EngineProvider, EventCallback,
    LogCallback,
};
use tokio::{io::AsyncReadExt, net::TcpStream, runtime::Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TcpProbeProvider {
    runtime: Handle,
}

impl TcpProbeProvider {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl EngineProvider for TcpProbeProvider {
    fn create(&self, info: &EngineBuildInfo) -> Result<Arc<dyn ConnectionEngine>, EngineError> {
        info!(
            pid = info.pid,
            sdk_version = %info.sdk_version,
            platform = %info.platform,
            cpu_arch = %info.cpu_arch,
            "creating tcp probe engine"
        );
        Ok(Arc::new(TcpProbeEngine {
            runtime: self.runtime.clone(),
            callbacks: Arc::new(EngineCallbacks::default()),
            session: Mutex::new(None),
        }))
    }
}

pub struct TcpProbeEngine {
    runtime: Handle,
    callbacks: Arc<EngineCallbacks>,
    session: Mutex<Option<CancellationToken>>,
}

impl ConnectionEngine for TcpProbeEngine {
    fn connect(&self, request: &ConnectRequest) -> Result<(), EngineError> {
        if request.host.is_empty() {
            return Err(EngineError::Connect("empty host".to_owned()));
        }

        let stop = CancellationToken::new();
        if let Some(previous) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(stop.clone())
        {
            previous.cancel();
        }

        let callbacks = Arc::clone(&self.callbacks);
        let target = (request.host.clone(), request.port);
        self.runtime.spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => debug!("probe session cancelled"),
                _ = run_probe(target, &callbacks) => callbacks.emit_disconnected(),
            }
        });
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(stop) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            stop.cancel();
        }
    }

    fn register_on_log(&self, callback: LogCallback) {
        self.callbacks.set_log(callback);
    }

    fn register_on_connected(&self, callback: EventCallback) {
        self.callbacks.set_connected(callback);
    }

    fn register_on_disconnected(&self, callback: EventCallback) {
        self.callbacks.set_disconnected(callback);
    }

    fn unregister_on_disconnected(&self) {
        self.callbacks.clear_disconnected();
    }
}

/// Hold a TCP connection open until the peer closes it or it fails.
async fn run_probe(target: (String, u16), callbacks: &EngineCallbacks) {
    let (host, port) = target;
    callbacks.emit_log(format!("dialing {host}:{port}"));

    let dial = TcpStream::connect((host.as_str(), port));
    let mut stream = match tokio::time::timeout(CONNECT_TIMEOUT, dial).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            callbacks.emit_log(format!("dial failed: {err}"));
            return;
        }
        Err(_) => {
            callbacks.emit_log(format!("dial timed out after {}s", CONNECT_TIMEOUT.as_secs()));
            return;
        }
    };

    callbacks.emit_log(format!("tcp session established with {host}:{port}"));
    callbacks.emit_connected();

    let mut buf = [0_u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                callbacks.emit_log("peer closed the connection");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                callbacks.emit_log(format!("read failed: {err}"));
                return;
            }
        }
    }
}
