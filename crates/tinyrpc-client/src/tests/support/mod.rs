//! Test harness utilities for the client suites.

mod fake_server;

pub(crate) use fake_server::{FakeServer, Script};
