//! Registry of pooled tasks that are still in flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use tinyrpc_protocol::{Request, RequestId};

#[derive(Debug)]
struct Entry {
    id: Option<RequestId>,
    method: String,
    args: usize,
    kwargs: usize,
    started: Instant,
}

/// Diagnostic view of one in-flight task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    /// Server-assigned task number.
    pub task: u64,
    /// Request id, absent for notifications.
    pub id: Option<RequestId>,
    /// Requested method.
    pub method: String,
    /// Number of positional arguments.
    pub args: usize,
    /// Number of keyword arguments.
    pub kwargs: usize,
    /// Time spent since the task was queued.
    pub running_ms: u64,
}

/// In-flight pooled tasks keyed by task number.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    next: AtomicU64,
    entries: Mutex<BTreeMap<u64, Entry>>,
}

impl TaskRegistry {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `request` as queued and returns its task number.
    pub(crate) fn register(&self, request: &Request) -> u64 {
        let task = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            task,
            Entry {
                id: request.id.clone(),
                method: request.method.clone(),
                args: request.args.len(),
                kwargs: request.kwargs.len(),
                started: Instant::now(),
            },
        );
        task
    }

    pub(crate) fn complete(&self, task: u64) {
        self.lock().remove(&task);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn snapshot(&self) -> Vec<TaskRecord> {
        self.lock()
            .iter()
            .map(|(task, entry)| TaskRecord {
                task: *task,
                id: entry.id.clone(),
                method: entry.method.clone(),
                args: entry.args,
                kwargs: entry.kwargs,
                running_ms: u64::try_from(entry.started.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
            })
            .collect()
    }
}
