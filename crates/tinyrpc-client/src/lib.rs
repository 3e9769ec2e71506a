//! Client for the tinyrpc embedded RPC runtime.
//!
//! [`ClientTransport`] mirrors the server's two endpoints: calls are written
//! to the receiver and replies are read from the replier, both sockets
//! announcing the same identity. [`RpcClient`] layers blocking calls with a
//! per-call deadline on top, and [`Subscriber`] follows the server's
//! broadcast stream.
//!
//! ```no_run
//! use serde_json::json;
//! use tinyrpc_client::RpcClient;
//! use tinyrpc_config::Config;
//!
//! # fn main() -> Result<(), tinyrpc_client::ClientError> {
//! let mut client = RpcClient::connect(&Config::default())?;
//! let mut relay = client.proxy("relay");
//! relay.call("close", vec![json!(3)], Default::default())?;
//! # Ok(())
//! # }
//! ```

mod client;
mod errors;
mod subscriber;
mod transport;

pub use client::{Kwargs, Proxy, RpcClient};
pub use errors::{ClientError, TransportError};
pub use subscriber::{HEARTBEAT, Subscriber};
pub use transport::{ClientTransport, generate_identity};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");
const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

#[cfg(test)]
mod tests;
