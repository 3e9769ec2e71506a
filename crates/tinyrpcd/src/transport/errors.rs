//! Error types for transport endpoints.

use thiserror::Error;

/// Errors surfaced while binding or running transport endpoints.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A socket could not be created or configured.
    #[error("failed to create {role} socket: {source}")]
    Socket {
        /// Endpoint the socket serves.
        role: &'static str,
        /// Underlying socket error.
        #[source]
        source: zmq::Error,
    },
    /// A socket could not be bound.
    #[error("failed to bind {role} socket at {endpoint}: {source}")]
    Bind {
        /// Endpoint the socket serves.
        role: &'static str,
        /// Address being bound.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: zmq::Error,
    },
    /// The bound address could not be read back.
    #[error("{role} socket reported no usable bound address")]
    LocalAddr {
        /// Endpoint the socket serves.
        role: &'static str,
    },
    /// Polling or reading a socket failed.
    #[error("failed to receive on {role} socket: {source}")]
    Receive {
        /// Endpoint the socket serves.
        role: &'static str,
        /// Underlying socket error.
        #[source]
        source: zmq::Error,
    },
    /// A broadcast could not be queued.
    #[error("failed to publish broadcast: {source}")]
    Publish {
        /// Underlying socket error.
        #[source]
        source: zmq::Error,
    },
}
