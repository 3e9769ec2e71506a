//! ZeroMQ endpoints for the server side of the runtime.
//!
//! Calls arrive on a `ROUTER` receiver socket and replies leave on a second
//! `ROUTER` replier socket. A client connects a `DEALER` to each, both
//! carrying the same identity, so the identity a call arrived with addresses
//! its reply. An optional `PUB` socket fans broadcasts out to subscribers.

mod errors;
mod publisher;
mod receiver;
mod replier;
mod socket;
#[cfg(test)]
mod test_utils;
mod token;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use self::errors::TransportError;
pub use self::publisher::{NoopPublisher, Publisher, ZmqPublisher};
pub use self::receiver::{Inbound, ReceiverEndpoint};
pub use self::replier::{Delivery, ReplyEndpoint, ReplySender, SendStats};
#[cfg(test)]
pub(crate) use self::test_utils::{TestPeer, TestSubscriber, wait_for};
pub use self::token::{Envelope, RoutingToken};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Cooperative stop signal shared between the serving loop and its owners.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
