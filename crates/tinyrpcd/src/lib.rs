//! Embedded RPC runtime exposing driver instances to remote test stations.
//!
//! A server binds two ZeroMQ endpoints: callers send requests to the receiver
//! and collect replies from the replier, identifying themselves with the same
//! identity on both. Requests are JSON-RPC 2.0 objects carrying positional
//! `args` and keyword `kwargs` (see [`tinyrpc_protocol`]).
//!
//! Components implement [`RpcService`] and are registered on a [`Dispatcher`],
//! optionally under a prefix such as `relay`, which makes their methods
//! callable as `relay.<method>`. [`RpcServer::start`] freezes the registry,
//! adds the `server.*` control surface and starts serving: a single poll
//! thread reads requests, control methods run inline, and everything else is
//! executed on a fixed worker pool. Replies share one send lock.
//!
//! The [`bootstrap_with`] entry point loads configuration, initialises
//! telemetry and binds the server; the `tinyrpcd` binary runs it until it
//! receives a termination signal or a `server.stop` call.

mod bootstrap;
pub mod dispatch;
mod health;
mod process;
pub mod server;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, RunningDaemon, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use dispatch::{
    Dispatcher, Method, MethodError, MethodResult, Params, RegistrationError, RpcService, Service,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, install_stop_flag, run_server, run_server_with};
pub use server::{Broadcaster, RpcServer, ServerError, ServerHandle, ServerSettings};
pub use telemetry::{LogControl, NoopLogControl, TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
