//! Wire model shared by the tinyrpc server and its clients.
//!
//! Calls travel as JSON-RPC 2.0 objects that carry positional arguments in an
//! `args` array and keyword arguments in a `kwargs` object. Replies carry
//! either a `result` or an `error`; batches are plain JSON arrays of either.
//!
//! The codec performs no I/O: [`decode`] and
//! [`decode_reply`] turn bytes into values and [`Encode`] turns values back
//! into bytes. Every failure is reported as a [`ProtocolError`] which maps onto
//! the [`ErrorKind`] taxonomy sent back to callers.

mod codec;
mod error;
mod message;

pub use codec::{Encode, decode, decode_reply};
pub use error::{ErrorKind, ProtocolError, RpcError};
pub use message::{
    BatchRequest, BatchResponse, InvalidMember, Message, Outcome, Reply, Request, RequestId,
    Response,
};

/// Protocol version carried in every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Separator placed between a namespace prefix and a method name.
pub const NAME_METHOD_SEPARATOR: &str = ".";
