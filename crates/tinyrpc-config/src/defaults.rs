use crate::endpoint::Endpoint;
use crate::logging::LogFormat;

/// Port the receiver binds when none is configured.
pub const DEFAULT_RECEIVER_PORT: u16 = 7801;

/// Offset applied to the receiver port to derive the replier port.
pub const REPLIER_PORT_OFFSET: u16 = 10000;

/// Number of pooled worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 16;

/// Bound on each inbound poll, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Interval between liveness broadcasts, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Client-side wait for a reply, in milliseconds.
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 3000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default receiver endpoint: every interface on [`DEFAULT_RECEIVER_PORT`].
pub fn default_receiver_endpoint() -> Endpoint {
    Endpoint::tcp("*", DEFAULT_RECEIVER_PORT)
}

/// Default worker thread count.
pub fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

/// Default poll interval.
pub fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default heartbeat interval.
pub fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

/// Default client timeout.
pub fn default_client_timeout_ms() -> u64 {
    DEFAULT_CLIENT_TIMEOUT_MS
}

/// Request logging is on unless disabled.
pub fn default_request_logging() -> bool {
    true
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
