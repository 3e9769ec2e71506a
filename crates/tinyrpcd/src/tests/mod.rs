//! Test suites for the tinyrpc server.

mod bootstrap_behaviour;
mod support;
