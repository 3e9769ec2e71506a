//! Opt-in request profiling.
//!
//! Two independent measurements can be switched on at runtime:
//!
//! - *breakdown*: per-method call counts and mean invocation time;
//! - *rtt*: for every request, the instants at which it was received, parsed,
//!   dispatched and serialised. Reports contain the time spent in each stage
//!   for every request whose timeline is complete.
//!
//! Requests that never produce a reply have their timeline discarded, and at
//! most `MAX_TIMELINES` timelines are kept; the oldest go first.
//!
//! All durations are reported in microseconds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

/// Upper bound on retained request timelines.
pub(crate) const MAX_TIMELINES: usize = 10_000;

/// Points recorded on a request timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Stage {
    Start,
    ParseRequest,
    Dispatch,
    Serialize,
}

impl Stage {
    const ALL: [Self; 4] = [
        Self::Start,
        Self::ParseRequest,
        Self::Dispatch,
        Self::Serialize,
    ];

    const fn key(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ParseRequest => "parse_request",
            Self::Dispatch => "dispatch",
            Self::Serialize => "serialize",
        }
    }
}

/// Handle to one request timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProfileToken(u64);

/// Call statistics for one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MethodSummary {
    /// Number of completed calls.
    pub ncall: u64,
    /// Mean invocation time.
    pub tot_avg: u64,
}

#[derive(Debug, Default)]
struct MethodTotals {
    calls: u64,
    total: Duration,
}

#[derive(Debug, Default)]
struct ProfileState {
    timelines: BTreeMap<u64, BTreeMap<Stage, Instant>>,
    methods: BTreeMap<String, MethodTotals>,
}

#[derive(Debug, Default)]
pub(crate) struct Profiler {
    breakdown: AtomicBool,
    rtt: AtomicBool,
    next: AtomicU64,
    state: Mutex<ProfileState>,
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl Profiler {
    fn lock(&self) -> MutexGuard<'_, ProfileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enable(&self, breakdown: bool, rtt: bool) {
        self.breakdown.store(breakdown, Ordering::SeqCst);
        self.rtt.store(rtt, Ordering::SeqCst);
    }

    pub(crate) fn clear(&self) {
        *self.lock() = ProfileState::default();
    }

    /// Opens a timeline for a request received at `received` when round
    /// trip profiling is on.
    pub(crate) fn begin(&self, received: Instant) -> Option<ProfileToken> {
        if !self.rtt.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        while state.timelines.len() >= MAX_TIMELINES {
            state.timelines.pop_first();
        }
        state
            .timelines
            .insert(id, BTreeMap::from([(Stage::Start, received)]));
        Some(ProfileToken(id))
    }

    /// Forgets a timeline that will never complete.
    pub(crate) fn discard(&self, token: Option<ProfileToken>) {
        if let Some(ProfileToken(id)) = token {
            self.lock().timelines.remove(&id);
        }
    }

    pub(crate) fn mark(&self, token: Option<ProfileToken>, stage: Stage) {
        let Some(ProfileToken(id)) = token else {
            return;
        };
        if let Some(timeline) = self.lock().timelines.get_mut(&id) {
            timeline.insert(stage, Instant::now());
        }
    }

    pub(crate) fn record_call(&self, method: &str, elapsed: Duration) {
        if !self.breakdown.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.lock();
        let totals = state.methods.entry(method.to_owned()).or_default();
        totals.calls += 1;
        totals.total += elapsed;
    }

    /// Per-method summaries.
    pub(crate) fn breakdown(&self) -> BTreeMap<String, MethodSummary> {
        self.lock()
            .methods
            .iter()
            .map(|(method, totals)| {
                let mean = u32::try_from(totals.calls)
                    .ok()
                    .and_then(|calls| totals.total.checked_div(calls))
                    .unwrap_or_default();
                let summary = MethodSummary {
                    ncall: totals.calls,
                    tot_avg: micros(mean),
                };
                (method.clone(), summary)
            })
            .collect()
    }

    /// Stage durations of every complete timeline.
    ///
    /// The result maps `keys` to the stage names in the order they occurred
    /// and every stage name to the time spent reaching it from the previous
    /// stage, one entry per request. Empty when no timeline is complete.
    pub(crate) fn stage_report(&self) -> Map<String, Value> {
        let state = self.lock();
        let complete: Vec<_> = state
            .timelines
            .values()
            .filter(|timeline| Stage::ALL.iter().all(|stage| timeline.contains_key(stage)))
            .collect();
        let Some(first) = complete.first() else {
            return Map::new();
        };
        let mut order: Vec<(Stage, Instant)> = first.iter().map(|(s, at)| (*s, *at)).collect();
        order.sort_by_key(|(_, at)| *at);
        let stages: Vec<Stage> = order.into_iter().map(|(stage, _)| stage).collect();

        let mut report = Map::new();
        let reported = stages.iter().skip(1);
        report.insert(
            "keys".to_owned(),
            reported.clone().map(|stage| Value::from(stage.key())).collect(),
        );
        for (previous, stage) in stages.iter().zip(reported) {
            let durations: Vec<Value> = complete
                .iter()
                .map(|timeline| {
                    let from = timeline.get(previous);
                    let to = timeline.get(stage);
                    let spent = match (from, to) {
                        (Some(from), Some(to)) => to.saturating_duration_since(*from),
                        _ => Duration::ZERO,
                    };
                    Value::from(micros(spent))
                })
                .collect();
            report.insert(stage.key().to_owned(), Value::Array(durations));
        }
        report
    }
}
