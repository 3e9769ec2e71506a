//! Method registry and request dispatch.
//!
//! Components describe themselves as [`Service`]s and are registered on a
//! [`Dispatcher`], optionally under a prefix. The server freezes the
//! dispatcher before serving, so lookups never contend with registration.

mod dispatcher;
mod errors;
mod method;
mod params;
mod service;
#[cfg(test)]
mod tests;

pub use self::dispatcher::{CallObserver, Dispatcher, MethodInfo};
pub(crate) use self::dispatcher::panic_message;
pub use self::errors::{MethodError, MethodNotFoundError, RegistrationError};
pub use self::method::{Method, MethodResult, to_result};
pub use self::params::Params;
pub use self::service::{RpcService, Service, ServiceBuilder};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
