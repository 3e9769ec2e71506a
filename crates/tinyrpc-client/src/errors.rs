//! Error types surfaced by the client.

use std::time::Duration;

use thiserror::Error;

use tinyrpc_config::EndpointParseError;
use tinyrpc_protocol::{ProtocolError, RpcError};

/// Failures of the client transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A socket could not be created or configured.
    #[error("failed to create socket: {0}")]
    Socket(#[source] zmq::Error),
    /// A socket could not be connected.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Address being dialled.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: zmq::Error,
    },
    /// The socket refused an outgoing message.
    #[error("failed to send message: {0}")]
    Send(#[source] zmq::Error),
    /// Polling or reading a socket failed.
    #[error("failed to receive message: {0}")]
    Receive(#[source] zmq::Error),
    /// The transport was shut down; [`reconnect`] reopens it.
    ///
    /// [`reconnect`]: crate::ClientTransport::reconnect
    #[error("the transport is closed")]
    Closed,
}

/// Failures of a remote call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No reply arrived before the deadline.
    #[error("call to '{method}' timed out after {timeout:?}")]
    Timeout {
        /// Method that was called.
        method: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The server answered with an error.
    #[error("remote call failed: {0}")]
    Remote(#[from] RpcError),
    /// A request could not be encoded or a reply could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A server endpoint could not be derived from the configuration.
    #[error(transparent)]
    Endpoint(#[from] EndpointParseError),
}

impl ClientError {
    /// Builds a timeout error for `method`.
    pub fn timeout(method: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            timeout,
        }
    }

    /// Returns `true` when the call timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
