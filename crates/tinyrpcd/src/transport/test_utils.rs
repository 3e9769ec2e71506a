//! Test helpers for the transport module.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use super::socket::poll_millis;

/// Polls `condition` until it holds or two seconds pass.
pub(crate) fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn receive_within(socket: &zmq::Socket, timeout: Duration) -> zmq::Result<Option<Vec<u8>>> {
    if socket.poll(zmq::POLLIN, poll_millis(timeout))? == 0 {
        return Ok(None);
    }
    Ok(socket.recv_multipart(0)?.pop())
}

/// Raw caller holding one `DEALER` per server endpoint.
pub(crate) struct TestPeer {
    outbound: zmq::Socket,
    inbound: zmq::Socket,
}

impl TestPeer {
    pub(crate) fn connect(
        context: &zmq::Context,
        receiver: SocketAddr,
        replier: SocketAddr,
        identity: &[u8],
    ) -> zmq::Result<Self> {
        let inbound = context.socket(zmq::DEALER)?;
        inbound.set_linger(0)?;
        inbound.set_identity(identity)?;
        inbound.connect(&format!("tcp://{replier}"))?;
        let outbound = context.socket(zmq::DEALER)?;
        outbound.set_linger(0)?;
        outbound.set_identity(identity)?;
        outbound.connect(&format!("tcp://{receiver}"))?;
        Ok(Self { outbound, inbound })
    }

    pub(crate) fn send(&self, payload: &[u8]) -> zmq::Result<()> {
        self.outbound.send(payload, 0)
    }

    /// Waits up to `timeout` for the next reply.
    pub(crate) fn receive(&self, timeout: Duration) -> zmq::Result<Option<Vec<u8>>> {
        receive_within(&self.inbound, timeout)
    }
}

/// `SUB` socket subscribed to every broadcast.
pub(crate) struct TestSubscriber {
    socket: zmq::Socket,
}

impl TestSubscriber {
    pub(crate) fn connect(context: &zmq::Context, publisher: SocketAddr) -> zmq::Result<Self> {
        let socket = context.socket(zmq::SUB)?;
        socket.set_linger(0)?;
        socket.set_subscribe(b"")?;
        socket.connect(&format!("tcp://{publisher}"))?;
        Ok(Self { socket })
    }

    pub(crate) fn receive(&self, timeout: Duration) -> zmq::Result<Option<Vec<u8>>> {
        receive_within(&self.socket, timeout)
    }
}
