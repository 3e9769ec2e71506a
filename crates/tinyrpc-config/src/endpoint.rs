use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const TCP_SCHEME: &str = "tcp";
const WILDCARD_HOST: &str = "*";
const ANY_ADDRESS: &str = "0.0.0.0";

/// TCP address of one of the runtime's endpoints.
///
/// Accepts `tcp://host:port`, bare `host:port`, and `*:port`; the wildcard
/// host binds every interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = if host == WILDCARD_HOST {
            ANY_ADDRESS.to_owned()
        } else {
            host
        };
        Self { host, port }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port. Zero requests an ephemeral port when binding.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns a copy of the endpoint using a different port.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }

    /// Returns a copy of the endpoint with the port shifted by `offset`.
    pub fn offset_port(&self, offset: u16) -> Result<Self, EndpointParseError> {
        let port = self
            .port
            .checked_add(offset)
            .ok_or_else(|| EndpointParseError::PortOverflow {
                endpoint: self.to_string(),
                offset,
            })?;
        Ok(self.with_port(port))
    }

    /// Returns `true` when the endpoint binds every interface.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.host == ANY_ADDRESS
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "{TCP_SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{TCP_SCHEME}://{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let address = match input.split_once("://") {
            Some((TCP_SCHEME, rest)) => rest,
            Some((other, _)) => return Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
            None => input,
        };

        if let Some(port) = address.strip_prefix("*:") {
            let port = port
                .parse::<u16>()
                .map_err(|_| EndpointParseError::InvalidPort(input.to_owned()))?;
            return Ok(Self::tcp(WILDCARD_HOST, port));
        }

        let url = Url::parse(&format!("{TCP_SCHEME}://{address}"))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
        let port = url
            .port()
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::tcp(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Errors encountered while parsing an [`Endpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not `tcp`.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host was missing.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// Port was missing.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// Port was not a valid TCP port.
    #[error("invalid port in '{0}'")]
    InvalidPort(String),
    /// Deriving a companion endpoint pushed the port past 65535.
    #[error("port of {endpoint} cannot be offset by {offset}")]
    PortOverflow { endpoint: String, offset: u16 },
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
