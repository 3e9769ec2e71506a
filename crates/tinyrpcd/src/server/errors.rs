//! Error types for the server core.

use std::io;

use thiserror::Error;

use tinyrpc_config::EndpointParseError;

use crate::dispatch::RegistrationError;
use crate::transport::TransportError;

/// Errors raised while building, starting or joining a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An endpoint could not be bound or started.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The replier endpoint could not be derived.
    #[error(transparent)]
    Endpoint(#[from] EndpointParseError),
    /// Registering the control surface failed.
    #[error("failed to register the control surface: {0}")]
    Registration(#[from] RegistrationError),
    /// A server thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A server thread panicked.
    #[error("{name} thread panicked")]
    ThreadPanic {
        /// Thread name.
        name: String,
    },
}
