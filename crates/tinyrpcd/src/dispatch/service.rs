//! Description of a component whose methods are exposed over RPC.
//!
//! A component describes itself as a [`Service`]: its members (callable or
//! not), the subset it marks as published, and optionally an explicit public
//! API whitelist. When a whitelist is present it alone decides what gets
//! exposed; otherwise every published member is exposed under its external
//! name.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::RegistrationError;
use super::method::Method;

/// Components exposing methods to remote callers.
pub trait RpcService: Send + Sync + 'static {
    /// Describes the members of this instance.
    fn describe(self: Arc<Self>) -> Service;
}

impl<T: RpcService> From<Arc<T>> for Service {
    fn from(instance: Arc<T>) -> Self {
        instance.describe()
    }
}

#[derive(Debug, Clone)]
enum Member {
    Callable(Method),
    Attribute,
}

/// Members of one registered instance.
#[derive(Debug, Clone)]
pub struct Service {
    instance: String,
    members: BTreeMap<String, Member>,
    published: Vec<Method>,
    public_api: Option<Vec<String>>,
}

impl Service {
    /// Starts describing an instance; `instance` names it in error messages.
    pub fn builder(instance: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            service: Self {
                instance: instance.into(),
                members: BTreeMap::new(),
                published: Vec::new(),
                public_api: None,
            },
        }
    }

    /// Name of the described instance.
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Resolves the methods to expose, keyed by their external names.
    pub(crate) fn exposed_methods(&self) -> Result<Vec<Method>, RegistrationError> {
        let Some(names) = &self.public_api else {
            return Ok(self.published.clone());
        };
        names
            .iter()
            .map(|name| match self.members.get(name) {
                Some(Member::Callable(method)) => Ok(method.renamed(name.as_str())),
                Some(Member::Attribute) => Err(RegistrationError::NotCallable {
                    name: name.clone(),
                }),
                None => Err(RegistrationError::UnresolvedMember {
                    instance: self.instance.clone(),
                    name: name.clone(),
                }),
            })
            .collect()
    }
}

/// Builder returned by [`Service::builder`].
#[derive(Debug)]
pub struct ServiceBuilder {
    service: Service,
}

impl ServiceBuilder {
    /// Adds a callable member that is not published.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.service
            .members
            .insert(method.name().to_owned(), Member::Callable(method));
        self
    }

    /// Adds a callable member and publishes it under its own name.
    #[must_use]
    pub fn publish(self, method: Method) -> Self {
        let external = method.name().to_owned();
        self.publish_as(external, method)
    }

    /// Adds a callable member and publishes it under `external`.
    #[must_use]
    pub fn publish_as(mut self, external: impl Into<String>, method: Method) -> Self {
        self.service.published.push(method.renamed(external));
        self.method(method)
    }

    /// Declares a non-callable member such as a data field.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.service.members.insert(name.into(), Member::Attribute);
        self
    }

    /// Declares the explicit whitelist of exposed member names.
    #[must_use]
    pub fn public_api<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service.public_api = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Finishes the description.
    #[must_use]
    pub fn build(self) -> Service {
        self.service
    }
}
