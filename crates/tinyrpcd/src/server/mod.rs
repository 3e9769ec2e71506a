//! Serving loop, worker pool and control surface.
//!
//! One poll thread owns the inbound queue. Each decoded request either runs
//! inline on that thread (the `server.*` control methods) or is handed to a
//! fixed pool of workers. Workers send their replies through the shared
//! replier, whose send lock serialises every write. Between polls the loop
//! broadcasts a heartbeat whenever the heartbeat interval has elapsed.

mod broadcast;
mod control;
mod errors;
mod pool;
mod preview;
mod profiler;
mod runtime;
mod tasks;

pub use self::broadcast::{Broadcaster, HEARTBEAT};
pub use self::control::{CONTROL_PREFIX, INLINE_METHODS, is_inline};
pub use self::errors::ServerError;
pub use self::profiler::MethodSummary;
pub use self::runtime::{RpcServer, ServerHandle, ServerSettings};
pub use self::tasks::TaskRecord;

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
