//! Reply addressing.

use std::fmt;

use uuid::Uuid;

/// Identity of an inbound connection, used to address its replies.
///
/// Taken from the identity frame that prefixes every call a `DEALER` sends;
/// an empty identity is replaced with a random one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RoutingToken(Vec<u8>);

impl RoutingToken {
    /// Wraps a client-declared identity.
    #[must_use]
    pub fn new(identity: impl Into<Vec<u8>>) -> Self {
        Self(identity.into())
    }

    /// Generates a random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string().into_bytes())
    }

    /// Uses `identity` unless it is empty.
    #[must_use]
    pub fn from_identity(identity: Vec<u8>) -> Self {
        if identity.is_empty() {
            Self::generate()
        } else {
            Self(identity)
        }
    }

    /// Raw identity bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RoutingToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for RoutingToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "RoutingToken({self})")
    }
}

/// One inbound message and the identity it arrived with.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Reply address.
    pub token: RoutingToken,
    /// Encoded call.
    pub payload: Vec<u8>,
}
