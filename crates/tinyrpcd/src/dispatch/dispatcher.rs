//! Hierarchical method registry and request dispatch.
//!
//! A [`Dispatcher`] holds methods of its own plus child dispatchers grouped
//! under string prefixes. Resolution tries the node's own methods first and
//! then, for every prefix that the requested name starts with, each child
//! under that prefix in registration order. The first match wins.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, warn};

use tinyrpc_protocol::{
    BatchRequest, BatchResponse, Message, NAME_METHOD_SEPARATOR, Reply, Request, Response,
    RpcError,
};

use super::DISPATCH_TARGET;
use super::errors::{MethodError, MethodNotFoundError, RegistrationError};
use super::method::Method;
use super::params::Params;
use super::service::Service;

/// Receives every dispatched call with its reply and invocation time.
///
/// Notifications are reported too, with the reply they would have had.
pub trait CallObserver {
    /// Called once per call after it has been resolved and invoked.
    fn observe(&self, request: &Request, response: &Response, elapsed: Duration);
}

impl CallObserver for () {
    fn observe(&self, _request: &Request, _response: &Response, _elapsed: Duration) {}
}

/// Catalogue entry returned by [`Dispatcher::all_methods`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    /// Name relative to its prefix.
    pub name: String,
    /// Documentation, if the method carries any.
    pub doc: Option<String>,
}

/// Method registry with prefix-scoped children.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    methods: BTreeMap<String, Method>,
    subdispatchers: Vec<(String, Vec<Dispatcher>)>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method` under its declared name.
    pub fn add_method(&mut self, method: Method) -> Result<(), RegistrationError> {
        let name = method.name().to_owned();
        self.insert(name, method)
    }

    /// Registers `method` under `name`.
    pub fn add_method_as(
        &mut self,
        name: impl Into<String>,
        method: Method,
    ) -> Result<(), RegistrationError> {
        let name = name.into();
        let method = method.renamed(name.as_str());
        self.insert(name, method)
    }

    fn insert(&mut self, name: String, method: Method) -> Result<(), RegistrationError> {
        if self.methods.contains_key(&name) {
            return Err(RegistrationError::duplicate(name));
        }
        self.methods.insert(name, method);
        Ok(())
    }

    /// Adds `child` under `prefix`, exactly as given.
    ///
    /// Fails when `child` shares a method name with a child already
    /// registered under the same prefix.
    pub fn add_subdispatch(
        &mut self,
        child: Self,
        prefix: impl Into<String>,
    ) -> Result<(), RegistrationError> {
        let prefix = prefix.into();
        match self
            .subdispatchers
            .iter_mut()
            .find(|(existing, _)| *existing == prefix)
        {
            Some((_, children)) => {
                let names: Vec<String> = children
                    .iter()
                    .flat_map(|sibling| sibling.methods.keys())
                    .filter(|name| child.methods.contains_key(*name))
                    .cloned()
                    .collect();
                if !names.is_empty() {
                    return Err(RegistrationError::NameCollision { prefix, names });
                }
                children.push(child);
            }
            None => self.subdispatchers.push((prefix, vec![child])),
        }
        Ok(())
    }

    /// Registers one instance at the root prefix.
    pub fn register_instance(
        &mut self,
        instance: impl Into<Service>,
    ) -> Result<(), RegistrationError> {
        self.register_instances([(String::new(), instance.into())])
    }

    /// Registers several instances, each under its own prefix.
    ///
    /// Non-empty prefixes gain the [`NAME_METHOD_SEPARATOR`], so an instance
    /// registered as `driver` answers `driver.<method>`. Either every
    /// instance is registered or none is.
    pub fn register_instances<I, P>(&mut self, instances: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = (P, Service)>,
        P: Into<String>,
    {
        let mut staged = self.clone();
        for (prefix, service) in instances {
            let mut child = Self::new();
            for method in service.exposed_methods()? {
                child.add_method(method)?;
            }
            let mut prefix = prefix.into();
            if !prefix.is_empty() {
                prefix.push_str(NAME_METHOD_SEPARATOR);
            }
            debug!(
                target: DISPATCH_TARGET,
                instance = service.instance(),
                prefix = %prefix,
                methods = child.methods.len(),
                "registering instance"
            );
            staged.add_subdispatch(child, prefix)?;
        }
        *self = staged;
        Ok(())
    }

    /// Resolves `name` to a registered method.
    pub fn get_method(&self, name: &str) -> Result<&Method, MethodNotFoundError> {
        self.lookup(name).ok_or_else(|| MethodNotFoundError {
            name: name.to_owned(),
        })
    }

    fn lookup(&self, name: &str) -> Option<&Method> {
        if let Some(method) = self.methods.get(name) {
            return Some(method);
        }
        self.subdispatchers
            .iter()
            .filter_map(|(prefix, children)| {
                name.strip_prefix(prefix.as_str())
                    .map(|rest| (rest, children))
            })
            .flat_map(|(rest, children)| children.iter().map(move |child| (rest, child)))
            .find_map(|(rest, child)| child.lookup(rest))
    }

    /// Lists every registered method keyed by its full prefix.
    ///
    /// Methods of this node and of children registered without a prefix are
    /// listed under `""`; nested children contribute under their combined
    /// prefix.
    #[must_use]
    pub fn all_methods(&self) -> BTreeMap<String, Vec<MethodInfo>> {
        let mut catalogue = BTreeMap::new();
        self.collect_methods("", &mut catalogue);
        catalogue.entry(String::new()).or_default();
        catalogue
    }

    fn collect_methods(&self, prefix: &str, catalogue: &mut BTreeMap<String, Vec<MethodInfo>>) {
        if !self.methods.is_empty() {
            let entry = catalogue.entry(prefix.to_owned()).or_default();
            entry.extend(self.methods.iter().map(|(name, method)| MethodInfo {
                name: name.clone(),
                doc: method.doc().map(str::to_owned),
            }));
        }
        for (child_prefix, children) in &self.subdispatchers {
            let combined = format!("{prefix}{child_prefix}");
            catalogue.entry(combined.clone()).or_default();
            for child in children {
                child.collect_methods(&combined, catalogue);
            }
        }
    }

    /// Dispatches one call.
    ///
    /// Returns `None` for notifications; the method still runs. Failures are
    /// always converted into error replies and never escape.
    pub fn dispatch(&self, request: &Request) -> Option<Response> {
        self.dispatch_with(request, &())
    }

    /// Like [`dispatch`](Self::dispatch), reporting the call to `observer`.
    ///
    /// A panic that escapes resolution or the observer becomes an opaque
    /// server error.
    pub fn dispatch_with(
        &self,
        request: &Request,
        observer: &dyn CallObserver,
    ) -> Option<Response> {
        let response = panic::catch_unwind(AssertUnwindSafe(|| {
            let started = Instant::now();
            let response = self.resolve_and_invoke(request);
            observer.observe(request, &response, started.elapsed());
            response
        }))
        .unwrap_or_else(|payload| {
            error!(
                target: DISPATCH_TARGET,
                method = %request.method,
                panic = %panic_message(payload.as_ref()),
                "dispatch failed outside method invocation"
            );
            Response::failure(request.id.clone(), RpcError::server_error())
        });
        if request.is_notification() {
            None
        } else {
            Some(response)
        }
    }

    /// Dispatches every member of `batch` in order, skipping notification
    /// replies. Members that failed to decode are answered with their error.
    pub fn dispatch_batch(&self, batch: &BatchRequest) -> BatchResponse {
        self.dispatch_batch_with(batch, &())
    }

    fn dispatch_batch_with(
        &self,
        batch: &BatchRequest,
        observer: &dyn CallObserver,
    ) -> BatchResponse {
        batch
            .members()
            .filter_map(|member| match member {
                Ok(request) => self.dispatch_with(request, observer),
                Err(invalid) => Some(Response::failure(
                    invalid.id.clone(),
                    invalid.error.clone(),
                )),
            })
            .collect()
    }

    /// Dispatches a decoded frame; `None` when nothing needs to be sent back.
    pub fn dispatch_message(&self, message: &Message) -> Option<Reply> {
        self.dispatch_message_with(message, &())
    }

    /// Like [`dispatch_message`](Self::dispatch_message), reporting every
    /// call to `observer`.
    pub fn dispatch_message_with(
        &self,
        message: &Message,
        observer: &dyn CallObserver,
    ) -> Option<Reply> {
        match message {
            Message::Single(request) => self.dispatch_with(request, observer).map(Reply::Single),
            Message::Batch(batch) => {
                let replies = self.dispatch_batch_with(batch, observer);
                if replies.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(replies))
                }
            }
        }
    }

    fn resolve_and_invoke(&self, request: &Request) -> Response {
        let method = match self.get_method(&request.method) {
            Ok(method) => method,
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    method = %error.name,
                    "method not found"
                );
                return Response::failure(
                    request.id.clone(),
                    RpcError::method_not_found(&request.method),
                );
            }
        };

        let params = Params::from_request(request);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| method.invoke(&params)));
        match outcome {
            Ok(Ok(value)) => Response::success(request.id.clone(), value),
            Ok(Err(MethodError::InvalidParams { message })) => {
                Response::failure(request.id.clone(), RpcError::invalid_params(message))
            }
            Ok(Err(MethodError::Application { message, trace })) => {
                debug!(
                    target: DISPATCH_TARGET,
                    method = %request.method,
                    error = %message,
                    "method failed"
                );
                Response::failure(request.id.clone(), RpcError::application(message, trace))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    target: DISPATCH_TARGET,
                    method = %request.method,
                    panic = %message,
                    "method panicked"
                );
                let trace = format!("method '{}' panicked: {message}", request.method);
                Response::failure(request.id.clone(), RpcError::application(message, Some(trace)))
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
