//! Error types for method registration, resolution and invocation.

use thiserror::Error;

/// Errors raised while building the dispatcher tree.
///
/// Registration is atomic: when any of these is returned the dispatcher is
/// left exactly as it was before the call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A method with the same name already exists in the target node.
    #[error("method '{name}' is already registered")]
    DuplicateName { name: String },
    /// A child added under an existing prefix shares method names with a
    /// child already registered there.
    #[error("methods {names:?} already registered under prefix '{prefix}'")]
    NameCollision { prefix: String, names: Vec<String> },
    /// A whitelisted name does not resolve to a member of the instance.
    #[error(
        "Failed to get RPC Public API from instance {instance}; Please contact author to confirm \
         \"rpc_public_api\" matches method name; missing member '{name}'"
    )]
    UnresolvedMember { instance: String, name: String },
    /// A whitelisted name resolves to a member that is not callable.
    #[error("method argument must be callable: '{name}'")]
    NotCallable { name: String },
}

impl RegistrationError {
    /// Creates a duplicate name error.
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }
}

/// Returned when a name resolves to no registered method.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Method not found: {name}")]
pub struct MethodNotFoundError {
    /// Name that failed to resolve.
    pub name: String,
}

/// Failure reported by a method implementation.
#[derive(Debug, Error)]
pub enum MethodError {
    /// Arguments could not be bound to the method's parameters.
    #[error("invalid params: {message}")]
    InvalidParams { message: String },
    /// The method ran and failed.
    #[error("{message}")]
    Application {
        message: String,
        trace: Option<String>,
    },
}

impl MethodError {
    /// Creates an argument binding error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates an application error without a trace.
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
            trace: None,
        }
    }

    /// Creates an application error from any error, recording its source
    /// chain as the trace.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut trace = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Application {
            message: error.to_string(),
            trace: Some(trace),
        }
    }
}

impl From<anyhow::Error> for MethodError {
    fn from(error: anyhow::Error) -> Self {
        Self::Application {
            message: error.to_string(),
            trace: Some(format!("{error:?}")),
        }
    }
}
