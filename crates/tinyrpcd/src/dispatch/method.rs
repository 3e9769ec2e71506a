//! Callable entries stored in the dispatcher.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::errors::MethodError;
use super::params::Params;

/// Value returned by every method implementation.
pub type MethodResult = Result<Value, MethodError>;

type Handler = dyn Fn(&Params<'_>) -> MethodResult + Send + Sync;

/// A named callable exposed to remote callers.
///
/// Cloning is cheap: clones share the same implementation, which
/// [`Method::ptr_eq`] can confirm.
#[derive(Clone)]
pub struct Method {
    name: String,
    doc: Option<String>,
    handler: Arc<Handler>,
}

impl Method {
    /// Wraps `handler` under its declared `name`.
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Params<'_>) -> MethodResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: None,
            handler: Arc::new(handler),
        }
    }

    /// Attaches documentation reported by `all_methods`.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Returns a clone sharing the implementation under another name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: self.doc.clone(),
            handler: Arc::clone(&self.handler),
        }
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation, if any.
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Runs the implementation.
    pub fn invoke(&self, params: &Params<'_>) -> MethodResult {
        (self.handler)(params)
    }

    /// Returns `true` when both entries share one implementation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Method")
            .field("name", &self.name)
            .field("doc", &self.doc)
            .finish_non_exhaustive()
    }
}

/// Serialises a method's return value.
///
/// Values that cannot be represented as JSON become application errors.
pub fn to_result<T: Serialize>(value: T) -> MethodResult {
    serde_json::to_value(value).map_err(|error| MethodError::from_error(&error))
}
