//! Caller-facing facade: initialize once, then start/stop and observe.

use std::sync::{Arc, PoisonError, RwLock};

use egress_core::{ConnectionStatus, EgressError, LogEntry, ObserverBridge};
use egress_platform::{DeviceIdSource, RandomDeviceId};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::{
    controller::{ConnectionController, ControllerConfig, SessionCredentials, prefix},
    engine::EngineProvider,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SdkConfig {
    client_key: String,
    device_id: String,
}

/// Facade over a [`ConnectionController`] holding the seeded configuration.
///
/// All failures are reported as `false` returns, status transitions and log
/// lines; nothing panics or propagates to the caller.
pub struct EgressSdk {
    controller: ConnectionController,
    config: RwLock<Option<SdkConfig>>,
}

impl EgressSdk {
    pub fn new(controller: ConnectionController) -> Self {
        Self {
            controller,
            config: RwLock::new(None),
        }
    }

    /// Build an SDK with default endpoint settings, delivering observer events
    /// on a dedicated task on `runtime`.
    pub fn spawn(provider: Arc<dyn EngineProvider>, runtime: &Handle) -> Self {
        Self::spawn_with_config(ControllerConfig::default(), provider, runtime)
    }

    pub fn spawn_with_config(
        config: ControllerConfig,
        provider: Arc<dyn EngineProvider>,
        runtime: &Handle,
    ) -> Self {
        let bridge = ObserverBridge::spawn(runtime);
        Self::new(ConnectionController::new(
            config,
            provider,
            bridge,
            runtime.clone(),
        ))
    }

    /// Seed the client key and resolve the device identifier.
    ///
    /// Calling again replaces the configuration used by the next `start`; a
    /// running session keeps its credentials.
    pub fn initialize(&self, identity: &dyn DeviceIdSource, client_key: impl Into<String>) {
        let client_key = client_key.into();
        let device_id = match identity.device_id() {
            Ok(device_id) => device_id,
            Err(err) => {
                warn!(error = %err, "device id unavailable; using a random id");
                RandomDeviceId::default()
                    .device_id()
                    .unwrap_or_default()
            }
        };

        let next = SdkConfig {
            client_key,
            device_id,
        };
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if config.as_ref() == Some(&next) {
            debug!("sdk already initialized with identical configuration");
            return;
        }
        *config = Some(next);
        info!("sdk initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.read_config().is_some()
    }

    /// Start the proxy. `false` when not initialized, misconfigured, already
    /// running, or the engine could not be created.
    pub fn start(&self) -> bool {
        match self.try_start() {
            Ok(generation) => {
                debug!(generation, "proxy start requested");
                true
            }
            Err(err) => {
                error!(code = %err.code, "{}", err.message);
                false
            }
        }
    }

    /// Like [`EgressSdk::start`] but returns the typed error.
    pub fn try_start(&self) -> Result<u64, EgressError> {
        let config = self.read_config().ok_or_else(EgressError::not_initialized)?;
        if config.client_key.trim().is_empty() {
            return Err(EgressError::empty_client_key());
        }

        debug!(
            client_key = %prefix(&config.client_key, 6),
            device_id = %prefix(&config.device_id, 8),
            "requesting proxy start"
        );
        self.controller.try_start(SessionCredentials {
            username: config.client_key.clone(),
            client_key: config.client_key,
            device_id: config.device_id,
        })
    }

    pub fn stop(&self) {
        if !self.is_initialized() {
            error!("sdk not initialized");
            return;
        }
        self.controller.stop();
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.controller.status()
    }

    pub fn set_status_observer<F>(&self, observer: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.controller.bridge().set_status_observer(observer);
    }

    pub fn set_log_observer<F>(&self, observer: F)
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        self.controller.bridge().set_log_observer(observer);
    }

    pub fn clear_observers(&self) {
        self.controller.bridge().clear_all();
    }

    /// Device identifier in use, or an empty string before `initialize`.
    pub fn device_id(&self) -> String {
        self.read_config()
            .map(|config| config.device_id)
            .unwrap_or_default()
    }

    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    fn read_config(&self) -> Option<SdkConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
