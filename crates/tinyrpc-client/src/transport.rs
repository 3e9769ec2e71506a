//! Client side of the two-socket transport.
//!
//! Calls leave on a `DEALER` connected to the server's receiver and replies
//! arrive on a second `DEALER` connected to its replier. Both sockets carry
//! the same identity so the server can route replies. Waiting for a reply is
//! a bounded poll of the reply socket, so a server that has gone away looks
//! the same as one that is slow to answer.

use std::thread;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use tinyrpc_config::Endpoint;

use crate::TRANSPORT_TARGET;
use crate::errors::TransportError;

const CONNECT_SETTLE: Duration = Duration::from_millis(100);
const RECONNECT_DELAY: Duration = Duration::from_millis(100);
const RECONNECT_SETTLE: Duration = Duration::from_millis(500);
const LOOPBACK: &str = "127.0.0.1";

/// Generates a fresh client identity.
#[must_use]
pub fn generate_identity() -> Vec<u8> {
    Uuid::new_v4().simple().to_string().into_bytes()
}

/// Address dialled for `endpoint`; wildcard hosts name the local machine.
fn dial_address(endpoint: &Endpoint) -> String {
    if endpoint.is_wildcard() {
        Endpoint::tcp(LOOPBACK, endpoint.port()).to_string()
    } else {
        endpoint.to_string()
    }
}

/// Creates a socket of `kind` and connects it to `endpoint`.
pub(crate) fn open_socket(
    context: &zmq::Context,
    kind: zmq::SocketType,
    endpoint: &Endpoint,
    identity: Option<&[u8]>,
) -> Result<zmq::Socket, TransportError> {
    let socket = context.socket(kind).map_err(TransportError::Socket)?;
    socket.set_linger(0).map_err(TransportError::Socket)?;
    if let Some(identity) = identity {
        socket.set_identity(identity).map_err(TransportError::Socket)?;
    }
    let address = dial_address(endpoint);
    socket
        .connect(&address)
        .map_err(|source| TransportError::Connect {
            endpoint: address,
            source,
        })?;
    Ok(socket)
}

/// Waits up to `timeout` for the next message on `socket`.
pub(crate) fn receive_within(
    socket: &zmq::Socket,
    timeout: Duration,
) -> Result<Option<Vec<u8>>, TransportError> {
    let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    let ready = socket
        .poll(zmq::POLLIN, millis)
        .map_err(TransportError::Receive)?;
    if ready == 0 {
        return Ok(None);
    }
    let mut frames = socket.recv_multipart(0).map_err(TransportError::Receive)?;
    Ok(frames.pop())
}

struct Connection {
    outbound: zmq::Socket,
    inbound: zmq::Socket,
}

impl Connection {
    fn open(
        context: &zmq::Context,
        receiver: &Endpoint,
        replier: &Endpoint,
        identity: &[u8],
    ) -> Result<Self, TransportError> {
        let inbound = open_socket(context, zmq::DEALER, replier, Some(identity))?;
        let outbound = open_socket(context, zmq::DEALER, receiver, Some(identity))?;
        Ok(Self { outbound, inbound })
    }
}

/// Pair of sockets used by one client.
///
/// The transport is never re-established on its own; after a timeout or a
/// server restart callers decide whether to [`reconnect`](Self::reconnect).
pub struct ClientTransport {
    context: zmq::Context,
    receiver: Endpoint,
    replier: Endpoint,
    identity: Vec<u8>,
    connection: Option<Connection>,
}

impl ClientTransport {
    /// Connects to a server with a freshly generated identity.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when either socket cannot be created or
    /// connected.
    pub fn connect(receiver: &Endpoint, replier: &Endpoint) -> Result<Self, TransportError> {
        Self::connect_as(receiver, replier, generate_identity())
    }

    /// Connects to a server using `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when either socket cannot be created or
    /// connected.
    pub fn connect_as(
        receiver: &Endpoint,
        replier: &Endpoint,
        identity: Vec<u8>,
    ) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let connection = Connection::open(&context, receiver, replier, &identity)?;
        // The server learns the identity once the handshake completes.
        thread::sleep(CONNECT_SETTLE);
        debug!(
            target: TRANSPORT_TARGET,
            receiver = %receiver,
            replier = %replier,
            "client connected"
        );
        Ok(Self {
            context,
            receiver: receiver.clone(),
            replier: replier.clone(),
            identity,
            connection: Some(connection),
        })
    }

    /// Identity announced on both sockets.
    #[must_use]
    pub fn identity(&self) -> &[u8] {
        &self.identity
    }

    /// Queues one encoded message for the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`shutdown`](Self::shutdown)
    /// and [`TransportError::Send`] when the socket refuses the message,
    /// for instance because its queue is full.
    pub fn send_message(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let connection = self.connection.as_ref().ok_or(TransportError::Closed)?;
        connection
            .outbound
            .send(payload, zmq::DONTWAIT)
            .map_err(TransportError::Send)
    }

    /// Waits up to `timeout` for the next reply; `None` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`shutdown`](Self::shutdown)
    /// and [`TransportError::Receive`] when polling the socket fails.
    pub fn receive_reply(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let connection = self.connection.as_ref().ok_or(TransportError::Closed)?;
        receive_within(&connection.inbound, timeout)
    }

    /// Closes both sockets and opens new ones with the same identity.
    ///
    /// Replies still in flight for the old sockets are lost.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when either socket cannot be recreated.
    pub fn reconnect(&mut self) -> Result<(), TransportError> {
        self.shutdown();
        thread::sleep(RECONNECT_DELAY);
        let connection =
            Connection::open(&self.context, &self.receiver, &self.replier, &self.identity)?;
        thread::sleep(RECONNECT_SETTLE);
        self.connection = Some(connection);
        debug!(target: TRANSPORT_TARGET, "client reconnected");
        Ok(())
    }

    /// Closes both sockets, discarding anything still queued.
    pub fn shutdown(&mut self) {
        self.connection = None;
    }

    /// Returns `true` while the sockets are open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

impl std::fmt::Debug for ClientTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientTransport")
            .field("receiver", &self.receiver)
            .field("replier", &self.replier)
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Endpoint::tcp("0.0.0.0", 5555), "tcp://127.0.0.1:5555")]
    #[case(Endpoint::tcp("bench-7", 5556), "tcp://bench-7:5556")]
    #[case(Endpoint::tcp("::1", 5557), "tcp://[::1]:5557")]
    fn dial_addresses_name_a_reachable_host(#[case] endpoint: Endpoint, #[case] expected: &str) {
        assert_eq!(dial_address(&endpoint), expected);
    }

    #[rstest]
    fn shut_down_transports_refuse_traffic() {
        let endpoint = Endpoint::tcp("127.0.0.1", 1);
        let mut transport =
            ClientTransport::connect_as(&endpoint, &endpoint, b"bench".to_vec()).expect("connect");
        transport.shutdown();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send_message(b"{}"),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            transport.receive_reply(Duration::from_millis(10)),
            Err(TransportError::Closed)
        ));
    }
}
