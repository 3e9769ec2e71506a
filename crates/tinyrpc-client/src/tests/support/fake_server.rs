//! Scripted stand-in for a tinyrpc server.
//!
//! Binds a receiver/replier `ROUTER` pair, decodes every call a client sends
//! and routes whatever messages the script returns back to the caller's
//! identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tinyrpc_config::Endpoint;
use tinyrpc_protocol::{Message, decode};

/// Produces reply messages for one decoded call.
pub(crate) type Script = Box<dyn FnMut(&Message) -> Vec<Vec<u8>> + Send>;

const POLL_MILLIS: i64 = 20;
/// Silence required after a stop request before the server exits.
const QUIET_MILLIS: i64 = 150;

pub(crate) struct FakeServer {
    receiver: Endpoint,
    replier: Endpoint,
    calls: Arc<Mutex<Vec<Message>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

fn bind_router(context: &zmq::Context) -> Result<(zmq::Socket, Endpoint)> {
    let socket = context.socket(zmq::ROUTER).context("create router")?;
    socket.set_linger(0).context("set linger")?;
    socket.bind("tcp://127.0.0.1:*").context("bind router")?;
    let address = socket
        .get_last_endpoint()
        .context("read endpoint")?
        .map_err(|_| anyhow!("endpoint is not UTF-8"))?;
    let endpoint = address.parse().context("parse endpoint")?;
    Ok((socket, endpoint))
}

impl FakeServer {
    pub(crate) fn spawn(script: Script) -> Result<Self> {
        let context = zmq::Context::new();
        let (receiver_socket, receiver) = bind_router(&context)?;
        let (replier_socket, replier) = bind_router(&context)?;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let recorded = Arc::clone(&calls);
        let stopping = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            Self::serve(&receiver_socket, &replier_socket, script, &recorded, &stopping)
        });
        Ok(Self {
            receiver,
            replier,
            calls,
            stop,
            handle: Some(handle),
        })
    }

    pub(crate) fn receiver(&self) -> &Endpoint {
        &self.receiver
    }

    pub(crate) fn replier(&self) -> &Endpoint {
        &self.replier
    }

    /// Calls decoded so far.
    pub(crate) fn calls(&self) -> Vec<Message> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Stops serving once the client has been quiet for a moment and
    /// surfaces any failure.
    pub(crate) fn finish(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::SeqCst);
        handle
            .join()
            .map_err(|_| anyhow!("fake server thread panicked"))?
    }

    fn serve(
        receiver: &zmq::Socket,
        replier: &zmq::Socket,
        mut script: Script,
        calls: &Mutex<Vec<Message>>,
        stop: &AtomicBool,
    ) -> Result<()> {
        loop {
            let stopping = stop.load(Ordering::SeqCst);
            let wait = if stopping { QUIET_MILLIS } else { POLL_MILLIS };
            if receiver.poll(zmq::POLLIN, wait).context("poll calls")? == 0 {
                if stopping {
                    return Ok(());
                }
                continue;
            }
            let mut frames = receiver.recv_multipart(0).context("read call")?;
            let payload = frames.pop().ok_or_else(|| anyhow!("empty call"))?;
            let identity = frames
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("call without identity"))?;
            let message = decode(&payload).context("decode call")?;
            let replies = script(&message);
            calls
                .lock()
                .map_err(|error| anyhow!("lock calls: {error}"))?
                .push(message);
            for reply in replies {
                let frames: [&[u8]; 2] = [&identity, &reply];
                // The client may already have gone.
                if replier.send_multipart(frames, zmq::DONTWAIT).is_err() {
                    return Ok(());
                }
            }
        }
    }
}
