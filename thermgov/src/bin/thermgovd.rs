//! Thermal governor daemon.
//!
//! Runs the control loop and the HTTP API until SIGINT or SIGTERM.
//! `--simulate` swaps sysfs for an in-memory octa-core CPU that heats up
//! and cools down on a loop, for trying the governor off-target.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use thermgov::{
    api::{self, SharedState},
    config::GovernorConfig,
    hw::{Platform, sim::SimulatedCpu},
    thermal::ThermalGovernor,
    tracing::prelude::*,
    tunables::Tunables,
};

/// Simulated temperature profile: warm-up, a hot spike, then cool-down.
const SIMULATED_PROFILE: &[i32] = &[
    40, 44, 48, 52, 56, 60, 64, 68, 72, 76, 80, 84, 86, 84, 78, 70, 62, 55, 50, 46, 42,
];

#[tokio::main]
async fn main() -> Result<()> {
    thermgov::tracing::init();

    let simulate = env::args().skip(1).any(|arg| arg == "--simulate");
    let config = GovernorConfig::from_env()?;

    let platform = if simulate {
        info!("Using simulated CPU backend");
        let cpu = SimulatedCpu::octa();
        cpu.set_temperature_script(SIMULATED_PROFILE.to_vec());
        Platform::simulated(cpu)
    } else {
        Platform::sysfs(&config).await?
    };

    let governor = ThermalGovernor::new(&config, platform).await?;
    let context = governor.context();
    let state = SharedState {
        tunables: Arc::new(Tunables::new(context.clone())),
        status_rx: context.subscribe(),
    };

    let cancellation = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(governor.run(cancellation.clone()));
    tracker.spawn({
        let cancellation = cancellation.clone();
        let addr = config.api_bind;
        async move {
            if let Err(e) = api::serve(addr, state, cancellation.clone()).await {
                error!(error = %e, "API server failed");
                cancellation.cancel();
            }
        }
    });
    tracker.close();

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown requested"),
        _ = cancellation.cancelled() => {}
    }

    cancellation.cancel();
    tracker.wait().await;
    info!("Exiting");

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
