//! The `server.*` control surface registered on every server.
//!
//! Every method here runs inline on the poll thread, so each one must return
//! quickly.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::info;

use crate::dispatch::{
    Method, MethodError, MethodInfo, MethodResult, Params, RpcService, Service, to_result,
};
use crate::telemetry::{LogControl, LogLevel};
use crate::transport::ShutdownFlag;

use super::SERVER_TARGET;
use super::profiler::Profiler;
use super::tasks::TaskRegistry;

/// Prefix the control surface is registered under.
pub const CONTROL_PREFIX: &str = "server";

/// Methods answered on the poll thread instead of the worker pool.
pub const INLINE_METHODS: &[&str] = &[
    "server.mode",
    "server.all_methods",
    "server.get_log",
    "server.reset_log",
    "server.set_logging_level",
    "server.profile_enable",
    "server.clear_profile_stats",
    "server.get_profile_stats",
    "server.tasks",
    "server.stop",
];

/// Whether `method` runs inline on the poll thread.
#[must_use]
pub fn is_inline(method: &str) -> bool {
    INLINE_METHODS.contains(&method)
}

const MODE: &str = "normal";
const PASS: &str = "PASS";
const RESET_DONE: &str = "--PASS--";
const DONE: &str = "done";

/// State shared between the poll loop and the control surface.
pub(crate) struct ServerState {
    pub(crate) stop: ShutdownFlag,
    pub(crate) tasks: TaskRegistry,
    pub(crate) profiler: Profiler,
    pub(crate) log_control: Arc<dyn LogControl>,
    pub(crate) catalogue: OnceCell<BTreeMap<String, Vec<MethodInfo>>>,
}

impl ServerState {
    pub(crate) fn new(log_control: Arc<dyn LogControl>) -> Self {
        Self {
            stop: ShutdownFlag::default(),
            tasks: TaskRegistry::default(),
            profiler: Profiler::default(),
            log_control,
            catalogue: OnceCell::new(),
        }
    }
}

pub(crate) struct ServerControl {
    state: Arc<ServerState>,
}

impl ServerControl {
    pub(crate) const fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    fn all_methods(&self) -> MethodResult {
        self.state
            .catalogue
            .get()
            .map_or_else(|| Ok(json!({})), to_result)
    }

    fn get_log(&self) -> Value {
        json!([PASS, self.state.log_control.collect()])
    }

    fn reset_log(&self) -> Value {
        self.state.log_control.reset();
        json!(RESET_DONE)
    }

    fn set_logging_level(&self, params: &Params<'_>) -> MethodResult {
        params.ensure_known(&["level"])?;
        let requested: String = params.get(0, "level")?;
        let level: LogLevel = requested
            .parse()
            .map_err(|_| MethodError::application(format!("unknown logging level '{requested}'")))?;
        self.state
            .log_control
            .set_level(level)
            .map_err(|error| MethodError::from_error(&error))?;
        info!(target: SERVER_TARGET, level = %level, "logging level changed");
        Ok(json!(DONE))
    }

    fn profile_enable(&self, params: &Params<'_>) -> MethodResult {
        params.ensure_known(&["breakdown", "rtt"])?;
        let breakdown = params.get_or(0, "breakdown", true)?;
        let rtt = params.get_or(1, "rtt", true)?;
        self.state.profiler.enable(breakdown, rtt);
        Ok(json!(DONE))
    }

    fn clear_profile_stats(&self) -> Value {
        self.state.profiler.clear();
        json!(DONE)
    }

    fn get_profile_stats(&self) -> MethodResult {
        let breakdown = self.state.profiler.breakdown();
        let stages = self.state.profiler.stage_report();
        to_result((breakdown, stages))
    }

    fn tasks(&self) -> MethodResult {
        to_result(self.state.tasks.snapshot())
    }

    fn stop(&self) -> Value {
        info!(target: SERVER_TARGET, "stop requested");
        self.state.stop.set();
        Value::Bool(true)
    }
}

type Handler = fn(&ServerControl, &Params<'_>) -> MethodResult;

fn bound(control: &Arc<ServerControl>, name: &str, handler: Handler) -> Method {
    let control = Arc::clone(control);
    Method::new(name, move |params| handler(&control, params))
}

impl RpcService for ServerControl {
    fn describe(self: Arc<Self>) -> Service {
        Service::builder("ServerControl")
            .publish(
                bound(&self, "mode", |_, _| Ok(json!(MODE)))
                    .with_doc("Returns the serving mode; doubles as a liveness check."),
            )
            .publish(
                bound(&self, "all_methods", |control, _| control.all_methods())
                    .with_doc("Lists every registered method keyed by prefix."),
            )
            .publish(
                bound(&self, "get_log", |control, _| Ok(control.get_log()))
                    .with_doc("Returns the retained log text."),
            )
            .publish(bound(&self, "reset_log", |control, _| Ok(control.reset_log())))
            .publish(
                bound(&self, "set_logging_level", ServerControl::set_logging_level).with_doc(
                    "Sets the log level: notset, debug, info, warning, error or fatal.",
                ),
            )
            .publish(
                bound(&self, "profile_enable", ServerControl::profile_enable)
                    .with_doc("Toggles per-method breakdown and round trip profiling."),
            )
            .publish(bound(&self, "clear_profile_stats", |control, _| {
                Ok(control.clear_profile_stats())
            }))
            .publish(
                bound(&self, "get_profile_stats", |control, _| control.get_profile_stats())
                    .with_doc("Returns [breakdown, stage durations] in microseconds."),
            )
            .publish(bound(&self, "tasks", |control, _| control.tasks()))
            .publish(
                bound(&self, "stop", |control, _| Ok(control.stop()))
                    .with_doc("Stops the serving loop."),
            )
            .build()
    }
}
