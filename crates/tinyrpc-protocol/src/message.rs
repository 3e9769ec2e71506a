//! Structured calls and replies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpcError;

/// Opaque identifier correlating a reply with its call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Number(i64),
    /// String identifier, as generated by the bundled client.
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(formatter, "{value}"),
            Self::Text(value) => formatter.write_str(value),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// A single call.
///
/// A request without an `id` is a notification: it is executed but never
/// answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier; `None` for notifications.
    pub id: Option<RequestId>,
    /// Fully qualified method name, possibly carrying a namespace prefix.
    pub method: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

impl Request {
    /// Builds a call that expects a reply.
    pub fn call(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            method: method.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Builds a one-way call.
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            id: None,
            method: method.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Replaces the positional arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Adds or replaces a keyword argument.
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    /// Replaces the keyword arguments.
    #[must_use]
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Returns `true` when no reply will be produced.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Result or error of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The method returned a value. `null` is a valid result.
    Result(Value),
    /// The call failed.
    Error(RpcError),
}

/// Reply to a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the call being answered; `None` when the call could not
    /// be decoded far enough to recover one.
    pub id: Option<RequestId>,
    /// Result or error.
    pub outcome: Outcome,
}

impl Response {
    /// Builds a successful reply.
    #[must_use]
    pub const fn success(id: Option<RequestId>, value: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(value),
        }
    }

    /// Builds a failed reply.
    #[must_use]
    pub const fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// Returns `true` when the reply carries an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Returns the error when the reply carries one.
    #[must_use]
    pub const fn error(&self) -> Option<&RpcError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }

    /// Converts the reply into a standard result.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(error),
        }
    }
}

/// Batch member that could not be decoded as a call.
///
/// The rest of the batch is still dispatched; this member is answered with
/// `error`, addressed to `id` when one could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidMember {
    /// Id found in the member, if any.
    pub id: Option<RequestId>,
    /// Error reported for the member.
    pub error: RpcError,
}

/// Ordered group of calls sent in one frame.
///
/// Members that failed to decode keep their position so their error replies
/// stay in order with the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRequest(Vec<Result<Request, InvalidMember>>);

impl BatchRequest {
    /// Wraps the supplied calls.
    #[must_use]
    pub fn new(requests: Vec<Request>) -> Self {
        requests.into_iter().collect()
    }

    /// Iterates over the decoded calls in order, skipping invalid members.
    pub fn iter(&self) -> impl Iterator<Item = &Request> + '_ {
        self.0.iter().filter_map(|member| member.as_ref().ok())
    }

    /// Iterates over every member in order.
    pub fn members(&self) -> std::slice::Iter<'_, Result<Request, InvalidMember>> {
        self.0.iter()
    }

    /// Number of members, invalid ones included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the batch holds no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the decoded calls, dropping invalid members.
    #[must_use]
    pub fn into_inner(self) -> Vec<Request> {
        self.0.into_iter().filter_map(Result::ok).collect()
    }
}

impl FromIterator<Request> for BatchRequest {
    fn from_iter<T: IntoIterator<Item = Request>>(iter: T) -> Self {
        Self(iter.into_iter().map(Ok).collect())
    }
}

impl FromIterator<Result<Request, InvalidMember>> for BatchRequest {
    fn from_iter<T: IntoIterator<Item = Result<Request, InvalidMember>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Replies to the non-notification members of a [`BatchRequest`], in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse(Vec<Response>);

impl BatchResponse {
    /// Wraps the supplied replies.
    #[must_use]
    pub const fn new(responses: Vec<Response>) -> Self {
        Self(responses)
    }

    /// Iterates over the replies in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Response> {
        self.0.iter()
    }

    /// Number of replies.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the batch holds no replies.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the replies.
    #[must_use]
    pub fn into_inner(self) -> Vec<Response> {
        self.0
    }
}

impl FromIterator<Response> for BatchResponse {
    fn from_iter<T: IntoIterator<Item = Response>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a BatchResponse {
    type Item = &'a Response;
    type IntoIter = std::slice::Iter<'a, Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Any decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// One call.
    Single(Request),
    /// Several calls sent together.
    Batch(BatchRequest),
}

/// Any decoded reply frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Reply to one call.
    Single(Response),
    /// Replies to a batch.
    Batch(BatchResponse),
}

impl Reply {
    /// Returns the single reply, discarding batches.
    #[must_use]
    pub fn into_single(self) -> Option<Response> {
        match self {
            Self::Single(response) => Some(response),
            Self::Batch(_) => None,
        }
    }
}
