//! Receiver for server broadcasts.

use std::time::{Duration, Instant};

use tinyrpc_config::Endpoint;

use crate::errors::TransportError;
use crate::transport::{open_socket, receive_within};

/// Message the server broadcasts when it has been idle for a heartbeat
/// interval.
pub const HEARTBEAT: &[u8] = b"FCT_HEARTBEAT";

/// `SUB` socket subscribed to everything a server publishes.
///
/// Broadcasts sent before the subscription reaches the server are not
/// delivered.
pub struct Subscriber {
    socket: zmq::Socket,
}

impl Subscriber {
    /// Subscribes to the publisher at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be created or
    /// connected.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let socket = open_socket(&context, zmq::SUB, endpoint, None)?;
        socket.set_subscribe(b"").map_err(TransportError::Socket)?;
        Ok(Self { socket })
    }

    /// Waits up to `timeout` for the next broadcast; `None` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Receive`] when polling the socket fails.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        receive_within(&self.socket, timeout)
    }

    /// Waits up to `timeout` for the next broadcast that is not a heartbeat.
    ///
    /// # Errors
    ///
    /// As [`receive`](Self::receive).
    pub fn receive_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receive(remaining)? {
                Some(payload) if payload == HEARTBEAT => {}
                other => return Ok(other),
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Subscriber").finish_non_exhaustive()
    }
}
