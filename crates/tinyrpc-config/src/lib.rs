//! Shared configuration for the tinyrpc daemon and its clients.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file, then `TINYRPC_*` environment variables, then command
//! line flags. Use [`Config::load`] (via [`OrthoConfig`]) for the process
//! arguments or `Config::load_from_iter` for an explicit argument list.

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use ortho_config::OrthoConfig;

pub use defaults::{
    DEFAULT_CLIENT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECEIVER_PORT, DEFAULT_WORKER_THREADS, REPLIER_PORT_OFFSET,
    default_client_timeout_ms, default_heartbeat_interval_ms, default_log_filter,
    default_log_filter_string, default_log_format, default_poll_interval_ms,
    default_receiver_endpoint, default_request_logging, default_worker_threads,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TINYRPC")]
pub struct Config {
    /// Endpoint on which calls are received.
    #[serde(default = "default_receiver_endpoint")]
    pub receiver_endpoint: Endpoint,
    /// Endpoint on which replies are sent. Derived from the receiver when
    /// absent.
    #[serde(default)]
    pub replier_endpoint: Option<Endpoint>,
    /// Endpoint on which broadcasts and heartbeats are published. Broadcasts
    /// are discarded when absent.
    #[serde(default)]
    pub publisher_endpoint: Option<Endpoint>,
    /// Number of pooled worker threads.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Bound on each inbound poll, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Interval between liveness broadcasts, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Client-side wait for a reply, in milliseconds.
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    /// Whether each received and sent payload is logged.
    #[serde(default = "default_request_logging")]
    pub request_logging: bool,
    /// Tracing filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receiver_endpoint: default_receiver_endpoint(),
            replier_endpoint: None,
            publisher_endpoint: None,
            worker_threads: default_worker_threads(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            client_timeout_ms: default_client_timeout_ms(),
            request_logging: default_request_logging(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint on which calls are received.
    #[must_use]
    pub fn receiver_endpoint(&self) -> &Endpoint {
        &self.receiver_endpoint
    }

    /// Endpoint on which replies are sent.
    ///
    /// When no replier is configured it shares the receiver's host and uses
    /// the receiver's port plus [`REPLIER_PORT_OFFSET`].
    pub fn replier_endpoint(&self) -> Result<Endpoint, EndpointParseError> {
        match &self.replier_endpoint {
            Some(endpoint) => Ok(endpoint.clone()),
            None => self.receiver_endpoint.offset_port(REPLIER_PORT_OFFSET),
        }
    }

    /// Endpoint on which broadcasts are published, if any.
    #[must_use]
    pub fn publisher_endpoint(&self) -> Option<&Endpoint> {
        self.publisher_endpoint.as_ref()
    }

    /// Number of pooled worker threads, never less than one.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.worker_threads.max(1)
    }

    /// Bound on each inbound poll.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Interval between liveness broadcasts.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Client-side wait for a reply.
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    /// Whether payload previews are logged.
    #[must_use]
    pub fn request_logging(&self) -> bool {
        self.request_logging
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
