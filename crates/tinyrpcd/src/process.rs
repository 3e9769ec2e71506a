//! Foreground process supervision: bootstrap, serve, stop on signals.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;
use tracing::info;

use crate::bootstrap::{BootstrapError, ConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::server::ServerError;
use crate::{StructuredHealthReporter, SystemConfigLoader};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors surfaced while running the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Installing the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server failed while starting or stopping.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Raises the returned flag when a termination signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError::Signals`] when a handler cannot be installed.
pub fn install_stop_flag() -> Result<Arc<AtomicBool>, LaunchError> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .map_err(|source| LaunchError::Signals { source })?;
    }
    Ok(flag)
}

/// Runs the server with the system configuration until a termination signal
/// or a `server.stop` call.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, signal setup or serving fails.
pub fn run_server() -> Result<(), LaunchError> {
    run_server_with(&SystemConfigLoader, Arc::new(StructuredHealthReporter::new()))
}

/// Like [`run_server`] with injected collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, signal setup or serving fails.
pub fn run_server_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let stop = install_stop_flag()?;
    let running = daemon.start()?;
    info!(
        target: PROCESS_TARGET,
        pid = std::process::id(),
        "server running; send SIGTERM or call server.stop to exit"
    );
    running.run_until(&stop)?;
    Ok(())
}
