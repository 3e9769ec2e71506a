//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;
use tinyrpc_config::{Config, Endpoint, OrthoConfig};

use crate::bootstrap::ConfigLoader;

/// Loader binding every endpoint to an ephemeral loopback port.
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            receiver_endpoint: Endpoint::tcp("127.0.0.1", 0),
            replier_endpoint: Some(Endpoint::tcp("127.0.0.1", 0)),
            worker_threads: 2,
            poll_interval_ms: 5,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid worker count.
#[derive(Debug, Default)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("tinyrpcd"),
            OsString::from("--worker-threads"),
            OsString::from("many"),
        ];
        Config::load_from_iter(args)
    }
}
