//! Inbound call endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, warn};

use tinyrpc_config::Endpoint;

use super::socket::{bind, local_addr, poll_millis};
use super::{Envelope, RoutingToken, TRANSPORT_TARGET, TransportError};

const ROLE: &str = "receiver";

/// Bound `ROUTER` socket on which calls arrive.
pub struct ReceiverEndpoint {
    socket: zmq::Socket,
}

impl ReceiverEndpoint {
    /// Binds the receiver to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be created or bound.
    pub fn bind(context: &zmq::Context, endpoint: &Endpoint) -> Result<Self, TransportError> {
        bind(context, zmq::ROUTER, ROLE, endpoint).map(|socket| Self { socket })
    }

    /// Address the receiver is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        local_addr(&self.socket, ROLE)
    }

    /// Hands the socket to the thread that will poll it.
    #[must_use]
    pub fn start(self) -> Inbound {
        Inbound {
            socket: self.socket,
        }
    }
}

impl std::fmt::Debug for ReceiverEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ReceiverEndpoint").finish_non_exhaustive()
    }
}

/// Receiver socket owned by the poll thread. Closed when dropped.
pub struct Inbound {
    socket: zmq::Socket,
}

impl Inbound {
    /// Waits up to `timeout` for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Receive`] when the socket fails.
    pub fn poll(&self, timeout: Duration) -> Result<Option<Envelope>, TransportError> {
        let receive = |source| TransportError::Receive { role: ROLE, source };
        let ready = self
            .socket
            .poll(zmq::POLLIN, poll_millis(timeout))
            .map_err(receive)?;
        if ready == 0 {
            return Ok(None);
        }
        let mut frames = self.socket.recv_multipart(0).map_err(receive)?;
        // A DEALER call arrives as [identity, payload].
        let Some(payload) = frames.pop() else {
            return Ok(None);
        };
        if frames.is_empty() {
            warn!(target: TRANSPORT_TARGET, "dropping call without an identity");
            return Ok(None);
        }
        let token = RoutingToken::from_identity(frames.swap_remove(0));
        debug!(target: TRANSPORT_TARGET, peer = %token, bytes = payload.len(), "call received");
        Ok(Some(Envelope { token, payload }))
    }
}
