//! Shared world for the bootstrap behaviour scenarios.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::server::ServerError;

use super::{FailingConfigLoader, RecordingHealthReporter, TestConfigLoader};

/// Mutable state threaded through bootstrap scenarios.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    run_result: Option<Result<(), ServerError>>,
}

impl TestWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            run_result: None,
        }
    }

    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader);
    }

    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
    }

    pub fn bootstrap(&mut self) {
        self.daemon = None;
        self.bootstrap_error = None;
        let reporter = Arc::clone(&self.reporter);
        match bootstrap_with(self.loader.as_ref(), reporter) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Starts the bootstrapped server and stops it again straight away.
    pub fn start_and_stop(&mut self) {
        let Some(daemon) = self.daemon.take() else {
            return;
        };
        let running = daemon.start().expect("server should start");
        let stop = AtomicBool::new(true);
        self.run_result = Some(running.run_until(&stop));
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub fn daemon_bootstrapped(&self) -> bool {
        self.daemon.is_some()
    }

    #[must_use]
    pub fn run_result(&self) -> Option<&Result<(), ServerError>> {
        self.run_result.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
