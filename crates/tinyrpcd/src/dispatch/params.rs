//! Argument binding for method implementations.
//!
//! Calls carry positional `args` and keyword `kwargs`. Implementations bind
//! them with one of the helpers below; every binding failure surfaces to the
//! caller as an `InvalidParams` error rather than an application failure.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use tinyrpc_protocol::Request;

use super::errors::MethodError;

/// Borrowed view of a call's arguments.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    /// Wraps positional and keyword arguments.
    #[must_use]
    pub fn new(args: &'a [Value], kwargs: &'a Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Borrows the arguments of `request`.
    #[must_use]
    pub fn from_request(request: &'a Request) -> Self {
        Self::new(&request.args, &request.kwargs)
    }

    /// Positional arguments.
    #[must_use]
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Keyword arguments.
    #[must_use]
    pub fn kwargs(&self) -> &'a Map<String, Value> {
        self.kwargs
    }

    /// Binds every positional argument at once, typically into a tuple.
    ///
    /// Keyword arguments are rejected.
    pub fn positional<T: DeserializeOwned>(&self) -> Result<T, MethodError> {
        if !self.kwargs.is_empty() {
            return Err(MethodError::invalid_params(format!(
                "unexpected keyword arguments: {}",
                self.keyword_names()
            )));
        }
        serde_json::from_value(Value::Array(self.args.to_vec()))
            .map_err(|error| MethodError::invalid_params(error.to_string()))
    }

    /// Binds every keyword argument at once, typically into a struct.
    ///
    /// Positional arguments are rejected.
    pub fn keyword<T: DeserializeOwned>(&self) -> Result<T, MethodError> {
        if !self.args.is_empty() {
            return Err(MethodError::invalid_params(format!(
                "expected keyword arguments only, got {} positional",
                self.args.len()
            )));
        }
        serde_json::from_value(Value::Object(self.kwargs.clone()))
            .map_err(|error| MethodError::invalid_params(error.to_string()))
    }

    /// Binds a parameter passed either by keyword `name` or at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, MethodError> {
        self.optional(index, name)?
            .ok_or_else(|| MethodError::invalid_params(format!("missing argument '{name}'")))
    }

    /// Like [`Params::get`] but falls back to `default` when absent.
    pub fn get_or<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
        default: T,
    ) -> Result<T, MethodError> {
        Ok(self.optional(index, name)?.unwrap_or(default))
    }

    /// Binds a parameter that may be omitted.
    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, MethodError> {
        let by_keyword = self.kwargs.get(name);
        let by_position = self.args.get(index);
        let value = match (by_keyword, by_position) {
            (Some(_), Some(_)) => {
                return Err(MethodError::invalid_params(format!(
                    "argument '{name}' given by position and keyword"
                )));
            }
            (Some(value), None) | (None, Some(value)) => value,
            (None, None) => return Ok(None),
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|error| MethodError::invalid_params(format!("argument '{name}': {error}")))
    }

    /// Rejects surplus positional arguments and unknown keywords.
    ///
    /// `names` lists the parameters in positional order.
    pub fn ensure_known(&self, names: &[&str]) -> Result<(), MethodError> {
        if self.args.len() > names.len() {
            return Err(MethodError::invalid_params(format!(
                "takes at most {} positional arguments but {} were given",
                names.len(),
                self.args.len()
            )));
        }
        let unknown: Vec<&str> = self
            .kwargs
            .keys()
            .map(String::as_str)
            .filter(|key| !names.contains(key))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(MethodError::invalid_params(format!(
                "unexpected keyword arguments: {}",
                unknown.join(", ")
            )))
        }
    }

    fn keyword_names(&self) -> String {
        self.kwargs
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
