//! Blocking call layer over [`ClientTransport`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::debug;

use tinyrpc_config::Config;
use tinyrpc_protocol::{
    BatchRequest, Encode, NAME_METHOD_SEPARATOR, Reply, Request, RequestId, Response,
    decode_reply,
};

use crate::CLIENT_TARGET;
use crate::errors::ClientError;
use crate::transport::{ClientTransport, generate_identity};

/// Keyword arguments of a call.
pub type Kwargs = Map<String, Value>;

/// Synchronous RPC client.
///
/// One call is outstanding at a time. Replies that do not belong to the
/// current call, such as late answers to calls that already timed out, are
/// discarded while waiting.
#[derive(Debug)]
pub struct RpcClient {
    transport: ClientTransport,
    timeout: Duration,
}

impl RpcClient {
    /// Wraps a connected transport.
    #[must_use]
    pub const fn new(transport: ClientTransport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Connects to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the replier endpoint cannot be derived or
    /// either endpoint cannot be reached.
    pub fn connect(config: &Config) -> Result<Self, ClientError> {
        let replier = config.replier_endpoint()?;
        let transport = ClientTransport::connect(config.receiver_endpoint(), &replier)?;
        Ok(Self::new(transport, config.client_timeout()))
    }

    /// Default timeout applied by [`call`](Self::call).
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Underlying transport.
    pub fn transport_mut(&mut self) -> &mut ClientTransport {
        &mut self.transport
    }

    /// Re-establishes both connections.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the server cannot be reached.
    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        self.transport.reconnect().map_err(ClientError::from)
    }

    /// Calls `method` and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] when the server reports a failure and
    /// [`ClientError::Timeout`] when no reply arrives in time.
    pub fn call(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, ClientError> {
        self.call_with_timeout(method, args, kwargs, self.timeout)
    }

    /// Calls `method`, waiting at most `timeout`.
    ///
    /// The server keeps executing a call that timed out here; its reply is
    /// dropped when it eventually arrives.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call).
    pub fn call_with_timeout(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let id = next_id();
        let request = Request::call(id.clone(), method)
            .with_args(args)
            .with_kwargs(kwargs);
        self.transport.send_message(&request.encode()?)?;
        self.await_reply(method, timeout, |reply| match reply {
            Reply::Single(response) if answers(&response, &id) => {
                Some(response.into_result().map_err(ClientError::from))
            }
            _ => None,
        })
    }

    /// Sends a one-way call; nothing is awaited.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the call cannot be encoded or sent.
    pub fn notify(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<(), ClientError> {
        let request = Request::notification(method)
            .with_args(args)
            .with_kwargs(kwargs);
        self.transport.send_message(&request.encode()?)?;
        Ok(())
    }

    /// Sends `batch` in one frame and returns the replies in server order.
    ///
    /// Notifications in the batch produce no reply; a batch made only of
    /// notifications returns an empty list without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] when the server rejects the whole
    /// batch and [`ClientError::Timeout`] when no reply arrives in time.
    pub fn batch(&mut self, batch: &BatchRequest) -> Result<Vec<Response>, ClientError> {
        let ids: HashSet<RequestId> = batch
            .iter()
            .filter_map(|request| request.id.clone())
            .collect();
        self.transport.send_message(&batch.encode()?)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.await_reply("batch", self.timeout, |reply| match reply {
            Reply::Batch(responses)
                if responses
                    .iter()
                    .any(|response| response.id.as_ref().is_some_and(|id| ids.contains(id))) =>
            {
                Some(Ok(responses.into_inner()))
            }
            Reply::Single(response) if response.id.is_none() && response.is_error() => {
                Some(response.into_result().map(|_| Vec::new()).map_err(ClientError::from))
            }
            _ => None,
        })
    }

    /// Returns a view that prefixes every method name with `prefix`.
    pub fn proxy(&mut self, prefix: &str) -> Proxy<'_> {
        Proxy {
            client: self,
            prefix: prefix.to_owned(),
        }
    }

    fn await_reply<T>(
        &mut self,
        method: &str,
        timeout: Duration,
        mut accept: impl FnMut(Reply) -> Option<Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::timeout(method, timeout));
            }
            let Some(payload) = self.transport.receive_reply(remaining)? else {
                return Err(ClientError::timeout(method, timeout));
            };
            if let Some(outcome) = accept(decode_reply(&payload)?) {
                return outcome;
            }
            debug!(target: CLIENT_TARGET, method, "discarding stale reply");
        }
    }
}

/// A reply answers the current call when it carries its id, or when it is a
/// rejection the server could not attribute to any id.
fn answers(response: &Response, id: &RequestId) -> bool {
    match &response.id {
        Some(reply_id) => reply_id == id,
        None => response.is_error(),
    }
}

fn next_id() -> RequestId {
    RequestId::Text(String::from_utf8_lossy(&generate_identity()).into_owned())
}

/// Prefix-scoped view of an [`RpcClient`].
#[derive(Debug)]
pub struct Proxy<'a> {
    client: &'a mut RpcClient,
    prefix: String,
}

impl Proxy<'_> {
    /// Prefix applied to every call.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully qualified name of `method` under this proxy.
    #[must_use]
    pub fn qualify(&self, method: &str) -> String {
        if self.prefix.is_empty() {
            method.to_owned()
        } else {
            format!("{}{NAME_METHOD_SEPARATOR}{method}", self.prefix)
        }
    }

    /// Calls `prefix.method`.
    ///
    /// # Errors
    ///
    /// As [`RpcClient::call`].
    pub fn call(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, ClientError> {
        let method = self.qualify(method);
        self.client.call(&method, args, kwargs)
    }

    /// Calls `prefix.method`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// As [`RpcClient::call_with_timeout`].
    pub fn call_with_timeout(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let method = self.qualify(method);
        self.client.call_with_timeout(&method, args, kwargs, timeout)
    }

    /// Sends `prefix.method` as a one-way call.
    ///
    /// # Errors
    ///
    /// As [`RpcClient::notify`].
    pub fn notify(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<(), ClientError> {
        let method = self.qualify(method);
        self.client.notify(&method, args, kwargs)
    }

    /// Nests a further prefix under this one.
    pub fn proxy(&mut self, prefix: &str) -> Proxy<'_> {
        let prefix = self.qualify(prefix);
        Proxy {
            client: &mut *self.client,
            prefix,
        }
    }
}
