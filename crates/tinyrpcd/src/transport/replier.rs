//! Outbound reply endpoint.
//!
//! Every caller connects a second `DEALER` here using the identity it
//! declared on the receiver. The `ROUTER` socket is not thread safe, so it
//! lives behind the single send lock that every worker takes to reply. A
//! reply to an identity that is not connected is dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{trace, warn};

use tinyrpc_config::Endpoint;

use super::socket::{bind, local_addr};
use super::{RoutingToken, TRANSPORT_TARGET, TransportError};

const ROLE: &str = "replier";

/// Result of one reply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The reply was queued for the peer.
    Delivered,
    /// No peer is connected for the routing token.
    NoPeer,
    /// The socket refused the reply.
    Failed,
}

/// Send lock instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendStats {
    /// Times the lock was taken.
    pub acquisitions: u64,
    /// Times the lock was released.
    pub releases: u64,
    /// Largest number of concurrent holders observed.
    pub max_overlap: usize,
}

#[derive(Debug, Default)]
struct LockCounters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    holders: AtomicUsize,
    max_overlap: AtomicUsize,
}

/// Tracks one holder of the send lock for as long as it lives.
struct SendGuard<'a> {
    counters: &'a LockCounters,
}

impl<'a> SendGuard<'a> {
    fn enter(counters: &'a LockCounters) -> Self {
        counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        let holders = counters.holders.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_overlap.fetch_max(holders, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.counters.holders.fetch_sub(1, Ordering::SeqCst);
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct Shared {
    socket: Mutex<zmq::Socket>,
    counters: LockCounters,
}

/// Cloneable handle used by workers to send replies.
#[derive(Clone)]
pub struct ReplySender {
    shared: Arc<Shared>,
}

impl ReplySender {
    /// Sends `payload` to the peer connected as `token`.
    ///
    /// Never fails: undeliverable replies are logged and dropped.
    pub fn send(&self, token: &RoutingToken, payload: &[u8]) -> Delivery {
        let socket = self
            .shared
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _guard = SendGuard::enter(&self.shared.counters);
        let frames: [&[u8]; 2] = [token.as_bytes(), payload];
        match socket.send_multipart(frames, zmq::DONTWAIT) {
            Ok(()) => {
                trace!(target: TRANSPORT_TARGET, peer = %token, "reply sent");
                Delivery::Delivered
            }
            Err(zmq::Error::EHOSTUNREACH) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    peer = %token,
                    "no connected peer for reply; dropping"
                );
                Delivery::NoPeer
            }
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    peer = %token,
                    error = %error,
                    "reply send failed; dropping"
                );
                Delivery::Failed
            }
        }
    }

    /// Snapshot of the send lock counters.
    #[must_use]
    pub fn stats(&self) -> SendStats {
        let counters = &self.shared.counters;
        SendStats {
            acquisitions: counters.acquisitions.load(Ordering::SeqCst),
            releases: counters.releases.load(Ordering::SeqCst),
            max_overlap: counters.max_overlap.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for ReplySender {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReplySender")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Bound `ROUTER` socket on which replies leave.
pub struct ReplyEndpoint {
    socket: zmq::Socket,
}

impl ReplyEndpoint {
    /// Binds the replier to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the socket cannot be created or bound.
    pub fn bind(context: &zmq::Context, endpoint: &Endpoint) -> Result<Self, TransportError> {
        bind(context, zmq::ROUTER, ROLE, endpoint).map(|socket| Self { socket })
    }

    /// Address the replier is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        local_addr(&self.socket, ROLE)
    }

    /// Moves the socket behind the send lock.
    #[must_use]
    pub fn start(self) -> ReplySender {
        ReplySender {
            shared: Arc::new(Shared {
                socket: Mutex::new(self.socket),
                counters: LockCounters::default(),
            }),
        }
    }
}

impl std::fmt::Debug for ReplyEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ReplyEndpoint").finish_non_exhaustive()
    }
}
