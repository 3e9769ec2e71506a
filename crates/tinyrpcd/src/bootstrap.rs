//! Server bootstrap orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ortho_config::OrthoError;
use thiserror::Error;

use tinyrpc_config::{Config, OrthoConfig};

use crate::health::HealthReporter;
use crate::server::{RpcServer, ServerError, ServerHandle};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

const STOP_POLL: Duration = Duration::from_millis(50);

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when no valid configuration can be built.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Binding the server endpoints failed.
    #[error("failed to bind server endpoints: {source}")]
    Server {
        /// Underlying server error.
        #[source]
        source: ServerError,
    },
}

/// Result of a successful bootstrap: a bound server that has not started.
pub struct Daemon {
    config: Config,
    server: RpcServer,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle.
    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    /// The bound server, for registering services before serving.
    pub fn server_mut(&mut self) -> &mut RpcServer {
        &mut self.server
    }

    /// Address the receiver is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the socket cannot report it.
    pub fn receiver_addr(&self) -> Result<SocketAddr, ServerError> {
        self.server.receiver_addr()
    }

    /// Starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the server cannot start.
    pub fn start(self) -> Result<RunningDaemon, ServerError> {
        let handle = self.server.start()?;
        self.reporter
            .server_started(handle.receiver_addr(), handle.replier_addr());
        Ok(RunningDaemon {
            handle,
            reporter: self.reporter,
        })
    }
}

/// A serving daemon.
pub struct RunningDaemon {
    handle: ServerHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl RunningDaemon {
    /// Handle of the running server.
    #[must_use]
    pub const fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Serves until `stop` is raised or a caller invokes `server.stop`,
    /// then waits for the server to wind down.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if a server thread panicked.
    pub fn run_until(self, stop: &AtomicBool) -> Result<(), ServerError> {
        while !self.handle.is_stopping() {
            if stop.load(Ordering::SeqCst) {
                self.handle.stop();
                break;
            }
            thread::sleep(STOP_POLL);
        }
        let outcome = self.handle.join();
        self.reporter.server_stopped();
        outcome
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration, telemetry or endpoint
/// binding fails. The reporter is told about the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let server = match RpcServer::bind(&config) {
        Ok(server) => server.with_log_control(Arc::new(telemetry.clone())),
        Err(source) => {
            let error = BootstrapError::Server { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        server,
        telemetry,
        reporter,
    })
}
