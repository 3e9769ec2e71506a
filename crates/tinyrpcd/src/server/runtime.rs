//! Server assembly and the serving loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tinyrpc_config::{Config, Endpoint};
use tinyrpc_protocol::{
    Encode, Message, ProtocolError, Reply, Request, Response, RpcError, decode,
};

use crate::dispatch::{CallObserver, Dispatcher, RegistrationError, Service};
use crate::telemetry::{LogControl, NoopLogControl};
use crate::transport::{
    Delivery, Envelope, Inbound, NoopPublisher, Publisher, ReceiverEndpoint, ReplyEndpoint,
    ReplySender, RoutingToken, SendStats, ZmqPublisher,
};

use super::broadcast::Broadcaster;
use super::control::{CONTROL_PREFIX, ServerControl, ServerState, is_inline};
use super::pool::WorkerPool;
use super::preview::preview;
use super::profiler::{ProfileToken, Stage};
use super::{SERVER_TARGET, ServerError};

/// Tunables of a running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Number of pooled workers.
    pub worker_threads: usize,
    /// Bound on each inbound poll.
    pub poll_interval: Duration,
    /// Time between heartbeats when nothing else is broadcast.
    pub heartbeat_interval: Duration,
    /// Whether every inbound frame is logged.
    pub request_logging: bool,
}

impl ServerSettings {
    /// Reads the settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_threads: config.worker_threads(),
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            request_logging: config.request_logging(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A bound server that is still accepting registrations.
///
/// Methods are registered on the server before [`RpcServer::start`], which
/// consumes it and freezes the registry for the lifetime of the serving loop.
/// Every socket the server binds shares one `zmq` context.
pub struct RpcServer {
    context: zmq::Context,
    dispatcher: Dispatcher,
    settings: ServerSettings,
    receiver: ReceiverEndpoint,
    replier: ReplyEndpoint,
    broadcaster: Broadcaster,
    log_control: Arc<dyn LogControl>,
}

impl RpcServer {
    /// Binds every endpoint named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when an endpoint cannot be derived or bound.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let context = zmq::Context::new();
        let receiver = ReceiverEndpoint::bind(&context, config.receiver_endpoint())?;
        let replier = ReplyEndpoint::bind(&context, &config.replier_endpoint()?)?;
        let publisher: Arc<dyn Publisher> = match config.publisher_endpoint() {
            Some(endpoint) => Arc::new(ZmqPublisher::bind(&context, endpoint)?),
            None => Arc::new(NoopPublisher),
        };
        Ok(Self::assemble(
            context,
            receiver,
            replier,
            publisher,
            ServerSettings::from_config(config),
        ))
    }

    /// Binds the receiver and replier at explicit endpoints, without a
    /// publisher.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when an endpoint cannot be bound.
    pub fn bind_endpoints(
        receiver: &Endpoint,
        replier: &Endpoint,
        settings: ServerSettings,
    ) -> Result<Self, ServerError> {
        let context = zmq::Context::new();
        let receiver = ReceiverEndpoint::bind(&context, receiver)?;
        let replier = ReplyEndpoint::bind(&context, replier)?;
        Ok(Self::assemble(
            context,
            receiver,
            replier,
            Arc::new(NoopPublisher),
            settings,
        ))
    }

    fn assemble(
        context: zmq::Context,
        receiver: ReceiverEndpoint,
        replier: ReplyEndpoint,
        publisher: Arc<dyn Publisher>,
        settings: ServerSettings,
    ) -> Self {
        let broadcaster = Broadcaster::new(publisher, settings.heartbeat_interval);
        Self {
            context,
            dispatcher: Dispatcher::new(),
            settings,
            receiver,
            replier,
            broadcaster,
            log_control: Arc::new(NoopLogControl),
        }
    }

    /// Context the server's sockets belong to; bind a [`ZmqPublisher`] on
    /// it to share the I/O threads.
    #[must_use]
    pub const fn context(&self) -> &zmq::Context {
        &self.context
    }

    /// Replaces the broadcast destination.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.broadcaster = Broadcaster::new(publisher, self.settings.heartbeat_interval);
        self
    }

    /// Serves `server.get_log` and friends from `log_control`.
    #[must_use]
    pub fn with_log_control(mut self, log_control: Arc<dyn LogControl>) -> Self {
        self.log_control = log_control;
        self
    }

    /// Registry the server will serve from.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Registers one instance at the root prefix.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::register_instance`].
    pub fn register_instance(
        &mut self,
        instance: impl Into<Service>,
    ) -> Result<(), RegistrationError> {
        self.dispatcher.register_instance(instance)
    }

    /// Registers several instances under their prefixes.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::register_instances`].
    pub fn register_instances<I, P>(&mut self, instances: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = (P, Service)>,
        P: Into<String>,
    {
        self.dispatcher.register_instances(instances)
    }

    /// Broadcast handle that drivers may keep for push notifications.
    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// Address the receiver is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the socket cannot report it.
    pub fn receiver_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.receiver.local_addr()?)
    }

    /// Address the replier is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the socket cannot report it.
    pub fn replier_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.replier.local_addr()?)
    }

    /// Registers the control surface, freezes the registry and starts
    /// serving on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the control surface cannot be registered
    /// or a thread cannot be started.
    pub fn start(mut self) -> Result<ServerHandle, ServerError> {
        let receiver_addr = self.receiver.local_addr()?;
        let replier_addr = self.replier.local_addr()?;

        let state = Arc::new(ServerState::new(Arc::clone(&self.log_control)));
        let control = Arc::new(ServerControl::new(Arc::clone(&state)));
        self.dispatcher
            .register_instances([(CONTROL_PREFIX, Service::from(control))])?;
        state
            .catalogue
            .get_or_init(|| self.dispatcher.all_methods());

        let pool = WorkerPool::new(self.settings.worker_threads)?;
        let inbound = self.receiver.start();
        let replies = self.replier.start();
        let context = ServeContext {
            dispatcher: Arc::new(self.dispatcher),
            replies: replies.clone(),
            state: Arc::clone(&state),
            request_logging: self.settings.request_logging,
        };
        let serving = ServingLoop {
            inbound,
            pool,
            context,
            broadcaster: self.broadcaster,
            poll_interval: self.settings.poll_interval,
        };
        let name = "tinyrpc-poll".to_owned();
        let poll = thread::Builder::new()
            .name(name.clone())
            .spawn(move || serving.run())
            .map_err(|source| ServerError::Spawn { name, source })?;

        info!(
            target: SERVER_TARGET,
            receiver = %receiver_addr,
            replier = %replier_addr,
            workers = self.settings.worker_threads,
            "server started"
        );
        Ok(ServerHandle {
            state,
            poll: Some(poll),
            receiver_addr,
            replier_addr,
            replies,
        })
    }
}

/// Handle to a running server.
///
/// Dropping the handle requests a stop without waiting for it.
pub struct ServerHandle {
    state: Arc<ServerState>,
    poll: Option<thread::JoinHandle<Result<(), ServerError>>>,
    receiver_addr: SocketAddr,
    replier_addr: SocketAddr,
    replies: ReplySender,
}

impl ServerHandle {
    /// Address callers send requests to.
    #[must_use]
    pub const fn receiver_addr(&self) -> SocketAddr {
        self.receiver_addr
    }

    /// Address callers collect replies from.
    #[must_use]
    pub const fn replier_addr(&self) -> SocketAddr {
        self.replier_addr
    }

    /// Requests the serving loop to stop.
    pub fn stop(&self) {
        self.state.stop.set();
    }

    /// Whether a stop was requested, locally or through `server.stop`.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.state.stop.is_set()
    }

    /// Number of pooled tasks in flight.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state.tasks.len()
    }

    /// Send lock instrumentation of the replier.
    #[must_use]
    pub fn send_stats(&self) -> SendStats {
        self.replies.stats()
    }

    /// Waits for the serving loop to finish. Queued tasks complete and their
    /// replies are sent before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if a server thread panicked.
    pub fn join(mut self) -> Result<(), ServerError> {
        let Some(poll) = self.poll.take() else {
            return Ok(());
        };
        poll.join().map_err(|_| ServerError::ThreadPanic {
            name: "tinyrpc-poll".to_owned(),
        })?
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.state.stop.set();
    }
}

struct ServingLoop {
    inbound: Inbound,
    pool: WorkerPool,
    context: ServeContext,
    broadcaster: Broadcaster,
    poll_interval: Duration,
}

impl ServingLoop {
    fn run(self) -> Result<(), ServerError> {
        let stop = self.context.state.stop.clone();
        while !stop.is_set() {
            match self.inbound.poll(self.poll_interval) {
                Ok(Some(envelope)) => self.accept(envelope),
                Ok(None) => {}
                Err(error) => warn!(
                    target: SERVER_TARGET,
                    error = %error,
                    "inbound poll failed"
                ),
            }
            self.broadcaster.heartbeat_if_due(Instant::now());
        }
        info!(target: SERVER_TARGET, "server stopping");
        drop(self.inbound);
        let drained = self.pool.join();
        info!(target: SERVER_TARGET, "server stopped");
        drained
    }

    fn accept(&self, envelope: Envelope) {
        let Envelope { token, payload } = envelope;
        let state = &self.context.state;
        let profile = state.profiler.begin(Instant::now());
        if self.context.request_logging {
            info!(
                target: SERVER_TARGET,
                peer = %token,
                tasks = state.tasks.len(),
                payload = %preview(&payload),
                "request received"
            );
        }

        let message = match decode(&payload) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    target: SERVER_TARGET,
                    peer = %token,
                    error = %error,
                    "rejecting undecodable request"
                );
                let reply = Reply::Single(Response::failure(None, error.to_rpc_error()));
                state.profiler.discard(profile);
                self.context.send(&token, &reply);
                return;
            }
        };
        state.profiler.mark(profile, Stage::ParseRequest);

        match message {
            Message::Single(request) if is_inline(&request.method) => {
                self.context
                    .execute(&token, &Message::Single(request), profile);
            }
            message => self.submit(token, message, profile),
        }
    }

    fn submit(&self, token: RoutingToken, message: Message, profile: Option<ProfileToken>) {
        let tasks: Vec<u64> = requests(&message)
            .map(|request| self.context.state.tasks.register(request))
            .collect();
        let context = self.context.clone();
        let queued = self.pool.submit(move || {
            context.execute(&token, &message, profile);
            for task in tasks {
                context.state.tasks.complete(task);
            }
        });
        if !queued {
            error!(target: SERVER_TARGET, "worker pool is closed; request dropped");
        }
    }
}

fn requests(message: &Message) -> Box<dyn Iterator<Item = &Request> + '_> {
    match message {
        Message::Single(request) => Box::new(std::iter::once(request)),
        Message::Batch(batch) => Box::new(batch.iter()),
    }
}

/// Everything a worker needs to answer one message.
#[derive(Clone)]
struct ServeContext {
    dispatcher: Arc<Dispatcher>,
    replies: ReplySender,
    state: Arc<ServerState>,
    request_logging: bool,
}

impl ServeContext {
    fn execute(&self, token: &RoutingToken, message: &Message, profile: Option<ProfileToken>) {
        let profiler = &self.state.profiler;
        let reply = self.dispatcher.dispatch_message_with(message, self);
        profiler.mark(profile, Stage::Dispatch);
        let Some(payload) = reply.as_ref().and_then(encode_reply) else {
            profiler.discard(profile);
            return;
        };
        profiler.mark(profile, Stage::Serialize);
        if self.replies.send(token, &payload) != Delivery::Delivered {
            profiler.discard(profile);
        }
    }

    fn send(&self, token: &RoutingToken, reply: &Reply) {
        if let Some(payload) = encode_reply(reply) {
            self.replies.send(token, &payload);
        }
    }
}

impl CallObserver for ServeContext {
    fn observe(&self, request: &Request, response: &Response, elapsed: Duration) {
        self.state.profiler.record_call(&request.method, elapsed);
        if self.request_logging {
            debug!(
                target: SERVER_TARGET,
                method = %request.method,
                failed = response.is_error(),
                elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                "request dispatched"
            );
        }
    }
}

/// Encodes `reply`, substituting opaque server errors when the results
/// cannot be serialised. `None` means nothing could be encoded; the caller
/// will time out.
fn encode_reply(reply: &Reply) -> Option<Vec<u8>> {
    encode_reply_with(reply, Reply::encode)
}

fn encode_reply_with(
    reply: &Reply,
    encode: impl Fn(&Reply) -> Result<Vec<u8>, ProtocolError>,
) -> Option<Vec<u8>> {
    match encode(reply) {
        Ok(payload) => return Some(payload),
        Err(error) => error!(
            target: SERVER_TARGET,
            error = %error,
            "failed to encode reply; sending server error"
        ),
    }
    let opaque =
        |response: &Response| Response::failure(response.id.clone(), RpcError::server_error());
    let fallback = match reply {
        Reply::Single(response) => Reply::Single(opaque(response)),
        Reply::Batch(replies) => Reply::Batch(replies.iter().map(opaque).collect()),
    };
    encode(&fallback)
        .inspect_err(|error| {
            error!(
                target: SERVER_TARGET,
                error = %error,
                "failed to encode server error; reply dropped"
            );
        })
        .ok()
}
