//! Socket construction shared by the server endpoints.

use std::net::SocketAddr;

use tinyrpc_config::Endpoint;

use super::TransportError;

/// Creates a socket of `kind` and binds it to `endpoint`.
///
/// Sockets never linger on close, so a stopping server does not wait for
/// peers that have gone away.
pub(super) fn bind(
    context: &zmq::Context,
    kind: zmq::SocketType,
    role: &'static str,
    endpoint: &Endpoint,
) -> Result<zmq::Socket, TransportError> {
    let socket = context
        .socket(kind)
        .map_err(|source| TransportError::Socket { role, source })?;
    socket
        .set_linger(0)
        .map_err(|source| TransportError::Socket { role, source })?;
    if matches!(kind, zmq::ROUTER) {
        // Report unroutable replies and let a reconnecting client take over
        // its identity.
        socket
            .set_router_mandatory(true)
            .and_then(|()| socket.set_router_handover(true))
            .map_err(|source| TransportError::Socket { role, source })?;
    }
    let address = endpoint.to_string();
    socket
        .bind(&address)
        .map_err(|source| TransportError::Bind {
            role,
            endpoint: address,
            source,
        })?;
    Ok(socket)
}

/// Address a bound socket is listening on; resolves ephemeral ports.
pub(super) fn local_addr(
    socket: &zmq::Socket,
    role: &'static str,
) -> Result<SocketAddr, TransportError> {
    let endpoint = socket
        .get_last_endpoint()
        .map_err(|source| TransportError::Socket { role, source })?
        .map_err(|_| TransportError::LocalAddr { role })?;
    endpoint
        .strip_prefix("tcp://")
        .and_then(|address| address.parse().ok())
        .ok_or(TransportError::LocalAddr { role })
}

/// Milliseconds for a zmq poll, saturating at the largest supported wait.
pub(super) fn poll_millis(timeout: std::time::Duration) -> i64 {
    i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
}
