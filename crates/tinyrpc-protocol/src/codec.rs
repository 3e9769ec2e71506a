//! JSON encoding of calls and replies.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::JSONRPC_VERSION;
use crate::error::{ErrorKind, ProtocolError, RpcError};
use crate::message::{
    BatchRequest, BatchResponse, InvalidMember, Message, Outcome, Reply, Request, RequestId,
    Response,
};

/// Values that can be written to the wire.
pub trait Encode {
    /// Serialises the value into a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] when serialisation fails.
    fn encode(&self) -> Result<Vec<u8>, ProtocolError>;
}

#[derive(Serialize, Deserialize)]
struct WireRequest {
    jsonrpc: String,
    method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
}

#[derive(Serialize, Deserialize)]
struct WireError {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    jsonrpc: String,
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

// Distinguishes `"result": null` from a missing member.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl From<&Request> for WireRequest {
    fn from(request: &Request) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: request.method.clone(),
            args: request.args.clone(),
            kwargs: request.kwargs.clone(),
            id: request.id.clone(),
        }
    }
}

impl TryFrom<WireRequest> for Request {
    type Error = ProtocolError;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        check_version(&wire.jsonrpc)?;
        if wire.method.is_empty() {
            return Err(ProtocolError::invalid("method name must not be empty"));
        }
        Ok(Self {
            id: wire.id,
            method: wire.method,
            args: wire.args,
            kwargs: wire.kwargs,
        })
    }
}

impl From<&RpcError> for WireError {
    fn from(error: &RpcError) -> Self {
        Self {
            code: error.kind.code(),
            message: error.message.clone(),
            kind: Some(error.kind),
            trace: error.trace.clone(),
        }
    }
}

impl From<WireError> for RpcError {
    fn from(wire: WireError) -> Self {
        Self {
            kind: wire.kind.unwrap_or_else(|| ErrorKind::from_code(wire.code)),
            message: wire.message,
            trace: wire.trace,
        }
    }
}

impl From<&Response> for WireResponse {
    fn from(response: &Response) -> Self {
        let (result, error) = match &response.outcome {
            Outcome::Result(value) => (Some(value.clone()), None),
            Outcome::Error(error) => (None, Some(WireError::from(error))),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: response.id.clone(),
            result,
            error,
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = ProtocolError;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        check_version(&wire.jsonrpc)?;
        let outcome = match (wire.result, wire.error) {
            (Some(value), None) => Outcome::Result(value),
            (None, Some(error)) => Outcome::Error(error.into()),
            _ => {
                return Err(ProtocolError::invalid(
                    "reply must carry exactly one of result or error",
                ));
            }
        };
        Ok(Self {
            id: wire.id,
            outcome,
        })
    }
}

fn check_version(version: &str) -> Result<(), ProtocolError> {
    if version == JSONRPC_VERSION {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedVersion {
            version: version.to_owned(),
        })
    }
}

fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(|source| ProtocolError::Encode { source })
}

fn structural<T>(value: Value) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value).map_err(|error| ProtocolError::invalid(error.to_string()))
}

fn parse(bytes: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|source| ProtocolError::Parse { source })
}

fn request_from_value(value: Value) -> Result<Request, ProtocolError> {
    if !value.is_object() {
        return Err(ProtocolError::invalid("request must be a JSON object"));
    }
    structural::<WireRequest>(value).and_then(Request::try_from)
}

fn response_from_value(value: Value) -> Result<Response, ProtocolError> {
    if !value.is_object() {
        return Err(ProtocolError::invalid("reply must be a JSON object"));
    }
    structural::<WireResponse>(value).and_then(Response::try_from)
}

/// Decodes one batch member, keeping failures in place.
fn batch_member(value: Value) -> Result<Request, InvalidMember> {
    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
    request_from_value(value).map_err(|error| InvalidMember {
        id,
        error: error.to_rpc_error(),
    })
}

/// Decodes an inbound call frame.
///
/// A JSON array is decoded as a batch; anything else must be a single call
/// object. Batch members that are not valid calls are kept as
/// [`InvalidMember`]s instead of failing the whole frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the payload is not JSON, is an empty batch,
/// or is a single call that is structurally invalid or names an unsupported
/// version.
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    match parse(bytes)? {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ProtocolError::invalid("batch must not be empty"));
            }
            Ok(Message::Batch(items.into_iter().map(batch_member).collect()))
        }
        value => request_from_value(value).map(Message::Single),
    }
}

/// Decodes a reply frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the payload is not a well-formed reply or
/// batch of replies.
pub fn decode_reply(bytes: &[u8]) -> Result<Reply, ProtocolError> {
    match parse(bytes)? {
        Value::Array(items) => items
            .into_iter()
            .map(response_from_value)
            .collect::<Result<BatchResponse, _>>()
            .map(Reply::Batch),
        value => response_from_value(value).map(Reply::Single),
    }
}

impl Encode for Request {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        to_bytes(&WireRequest::from(self))
    }
}

impl Encode for Response {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        to_bytes(&WireResponse::from(self))
    }
}

impl Encode for BatchRequest {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let wire: Vec<WireRequest> = self.iter().map(WireRequest::from).collect();
        to_bytes(&wire)
    }
}

impl Encode for BatchResponse {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let wire: Vec<WireResponse> = self.iter().map(WireResponse::from).collect();
        to_bytes(&wire)
    }
}

impl Encode for Message {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Single(request) => request.encode(),
            Self::Batch(batch) => batch.encode(),
        }
    }
}

impl Encode for Reply {
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Self::Single(response) => response.encode(),
            Self::Batch(batch) => batch.encode(),
        }
    }
}
