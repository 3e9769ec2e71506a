//! Broadcast fan-out.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tinyrpc_config::Endpoint;

use super::TransportError;
use super::socket::{bind, local_addr};

const ROLE: &str = "publisher";

/// Destination for broadcast notifications such as heartbeats.
pub trait Publisher: Send + Sync {
    /// Sends `message` to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Publish`] when the broadcast could not be
    /// handed to the transport at all.
    fn publish(&self, message: &[u8]) -> Result<(), TransportError>;
}

impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    fn publish(&self, message: &[u8]) -> Result<(), TransportError> {
        self.as_ref().publish(message)
    }
}

/// Publisher that discards every broadcast.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _message: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Publisher backed by a `PUB` socket.
///
/// Subscribers that are slow or gone miss broadcasts; publishing never
/// blocks.
pub struct ZmqPublisher {
    socket: Mutex<zmq::Socket>,
    local_addr: SocketAddr,
}

impl ZmqPublisher {
    /// Binds the publisher to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be created or bound.
    pub fn bind(context: &zmq::Context, endpoint: &Endpoint) -> Result<Self, TransportError> {
        let socket = bind(context, zmq::PUB, ROLE, endpoint)?;
        let local_addr = local_addr(&socket, ROLE)?;
        Ok(Self {
            socket: Mutex::new(socket),
            local_addr,
        })
    }

    /// Address subscribers connect to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Publisher for ZmqPublisher {
    fn publish(&self, message: &[u8]) -> Result<(), TransportError> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message, zmq::DONTWAIT)
            .map_err(|source| TransportError::Publish { source })
    }
}

impl std::fmt::Debug for ZmqPublisher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ZmqPublisher")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
