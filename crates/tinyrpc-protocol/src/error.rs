//! Error taxonomy reported to remote callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed call.
///
/// Each category carries a stable JSON-RPC error code so that peers which
/// ignore the `kind` field can still classify the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The payload could not be parsed.
    ParseError,
    /// The payload parsed but is not a valid call.
    InvalidRequest,
    /// No registered method matches the requested name.
    MethodNotFound,
    /// Arguments could not be bound to the method's parameters.
    InvalidParams,
    /// The method itself failed.
    ApplicationError,
    /// The server failed outside resolution and invocation.
    ServerError,
}

impl ErrorKind {
    /// Returns the JSON-RPC error code for the category.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::ApplicationError => -32000,
            Self::ServerError => -32603,
        }
    }

    /// Classifies a JSON-RPC error code.
    ///
    /// Codes outside the reserved range are treated as application failures.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::ServerError,
            _ => Self::ApplicationError,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::ParseError => "parse error",
            Self::InvalidRequest => "invalid request",
            Self::MethodNotFound => "method not found",
            Self::InvalidParams => "invalid params",
            Self::ApplicationError => "application error",
            Self::ServerError => "server error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Error object carried by a failed [`crate::Response`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RpcError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Server-side trace for application failures.
    pub trace: Option<String>,
}

impl RpcError {
    /// Message used for opaque server failures.
    pub const SERVER_ERROR_MESSAGE: &'static str = "Server error";

    /// Builds an error of the given kind without a trace.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: None,
        }
    }

    /// Builds a parse failure.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// Builds an invalid request failure.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Builds a method resolution failure for `method`.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("Method not found: {method}"))
    }

    /// Builds an argument binding failure.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Builds an application failure carrying an optional trace.
    pub fn application(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            kind: ErrorKind::ApplicationError,
            message: message.into(),
            trace,
        }
    }

    /// Builds the opaque server failure. It never carries internal detail.
    #[must_use]
    pub fn server_error() -> Self {
        Self::new(ErrorKind::ServerError, Self::SERVER_ERROR_MESSAGE)
    }
}

/// Failures raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON.
    #[error("failed to parse payload: {source}")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload is JSON but does not describe a valid message.
    #[error("invalid message: {message}")]
    InvalidRequest {
        /// Description of the structural problem.
        message: String,
    },
    /// The `jsonrpc` member names a version other than 2.0.
    #[error("unsupported protocol version '{version}'")]
    UnsupportedVersion {
        /// Version found in the payload.
        version: String,
    },
    /// A value could not be serialised.
    #[error("failed to encode message: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Creates a structural error with a custom message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Returns the category reported to the peer.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::InvalidRequest { .. } | Self::UnsupportedVersion { .. } => {
                ErrorKind::InvalidRequest
            }
            Self::Encode { .. } => ErrorKind::ServerError,
        }
    }

    /// Converts the failure into the error object sent to the peer.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        match self.kind() {
            ErrorKind::ServerError => RpcError::server_error(),
            kind => RpcError::new(kind, self.to_string()),
        }
    }
}
