mod config;
mod logging;
mod probe_engine;

use std::{process::ExitCode, sync::Arc, time::Duration};

use config::SmokeConfig;
use egress_platform::{DeviceIdSource, FileDeviceIdStore, RandomDeviceId, StaticDeviceId};
use egress_runtime::EgressSdk;
use probe_engine::TcpProbeProvider;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    info!("starting egress-smoke");

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!("Set EGRESS_CLIENT_KEY to run the smoke test: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = Handle::current();
    let provider = Arc::new(TcpProbeProvider::new(runtime.clone()));
    let sdk = EgressSdk::spawn_with_config(config.controller_config(), provider, &runtime);

    sdk.set_status_observer(|status| println!("status: {status}"));
    sdk.set_log_observer(|entry| println!("log: {entry}"));

    let identity = identity_source(&config);
    sdk.initialize(identity.as_ref(), config.client_key.clone());
    info!(device_id = %sdk.device_id(), "using device id");

    if !sdk.start() {
        error!("proxy failed to start");
        return ExitCode::FAILURE;
    }

    tokio::select! {
        _ = tokio::time::sleep(config.run_for) => {
            info!(run_secs = config.run_for.as_secs(), "run time elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed waiting for ctrl-c");
            }
            info!("interrupted");
        }
    }

    sdk.stop();
    // Let the delivery task print the final status before exiting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    sdk.clear_observers();
    info!(status = %sdk.status(), "egress-smoke finished");
    ExitCode::SUCCESS
}

fn identity_source(config: &SmokeConfig) -> Box<dyn DeviceIdSource> {
    match (&config.device_id, &config.device_id_file) {
        (Some(device_id), _) => Box::new(StaticDeviceId::new(device_id.clone())),
        (None, Some(path)) => Box::new(FileDeviceIdStore::new(path.clone())),
        (None, None) => Box::new(RandomDeviceId::default()),
    }
}
