//! Completion tracking for in-flight operations.
//!
//! The [`DependencyTracker`] hands out [`Handle`]s: waitable tokens that
//! become signaled when the operation they stand for finishes on the
//! accelerator. A handle is registered *before* its operation is submitted,
//! so a submission that fails can still settle it (with an error) instead of
//! leaving it pending forever.
//!
//! Handles are backed by host-controlled [`Event`]s, which lets them appear
//! directly in the wait-lists of later submissions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tandem_device::{CommandStatus, Error as DeviceError, Event};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Operation a handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// One-time load of the static input.
    StaticLoad,
    Load,
    Compute,
    Store,
    /// Single-shot kernel launch.
    Task,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StaticLoad => "static load",
            Self::Load => "load",
            Self::Compute => "compute",
            Self::Store => "store",
            Self::Task => "task",
        })
    }
}

/// Opaque completion token for one submitted operation.
#[derive(Clone)]
pub struct Handle {
    op: OpKind,
    chunk: Option<usize>,
    event: Event,
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.event.id()
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn chunk(&self) -> Option<usize> {
        self.chunk
    }

    /// Event to place in a wait-list.
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn is_signaled(&self) -> bool {
        self.event.is_signaled()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id())
            .field("op", &self.op)
            .field("chunk", &self.chunk)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

/// First operation observed to complete with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub op: OpKind,
    pub chunk: Option<usize>,
    pub reason: String,
}

fn record_failure(first_failure: &Mutex<Option<Failure>>, op: OpKind, chunk: Option<usize>, reason: &str) {
    let mut first = first_failure.lock();
    if first.is_none() {
        warn!(%op, ?chunk, %reason, "operation completed with error");
        *first = Some(Failure { op, chunk, reason: reason.to_string() });
    }
}

/// Registry of every handle issued during one pipeline run.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    handles: Mutex<Vec<Handle>>,
    first_failure: Arc<Mutex<Option<Failure>>>,
    deadline: Option<Duration>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker whose blocking waits give up after `deadline`.
    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self { deadline, ..Self::default() }
    }

    /// Issue a new pending handle for an operation about to be submitted.
    pub fn register(&self, op: OpKind, chunk: Option<usize>) -> Handle {
        let handle = Handle { op, chunk, event: Event::user() };

        let first_failure = Arc::clone(&self.first_failure);
        handle.event.on_complete(move |event| {
            if let Some(reason) = event.failure() {
                record_failure(&first_failure, op, chunk, &reason);
            }
        });

        self.handles.lock().push(handle.clone());
        handle
    }

    /// Settle `handle` when the accelerator settles `event`, with the same outcome.
    pub fn bind(&self, handle: &Handle, event: &Event) {
        let target = handle.event.clone();
        event.on_complete(move |source| match source.failure() {
            Some(reason) => {
                target.fail(reason);
            }
            None => {
                target.complete();
            }
        });
    }

    /// Mark `handle` signaled. Idempotent.
    pub fn complete(&self, handle: &Handle) -> bool {
        handle.event.complete()
    }

    /// Mark `handle` signaled with an error. Idempotent.
    pub fn fail(&self, handle: &Handle, reason: impl Into<Arc<str>>) -> bool {
        handle.event.fail(reason)
    }

    /// Non-blocking poll.
    pub fn is_signaled(&self, handle: &Handle) -> bool {
        handle.is_signaled()
    }

    /// Block until `handle` is signaled.
    ///
    /// Returns immediately if it already is. A handle signaled with an error
    /// yields `CompletedWithError`; an expired deadline yields `WaitTimeout`.
    pub fn wait(&self, handle: &Handle) -> Result<()> {
        let result = match self.deadline {
            Some(deadline) => handle.event.wait_timeout(deadline),
            None => handle.event.wait(),
        };
        result.map_err(|source| Self::classify(handle, source))
    }

    fn classify(handle: &Handle, source: DeviceError) -> Error {
        let (op, chunk) = (handle.op, handle.chunk);
        match source {
            DeviceError::CommandFailed { reason, .. } => Error::CompletedWithError { op, chunk, reason },
            DeviceError::WaitTimeout { waited_ms, .. } => Error::WaitTimeout { op, chunk, waited_ms },
            source => Error::Device { source },
        }
    }

    /// Fail fast if any handle has completed with an error.
    pub fn check(&self) -> Result<()> {
        match self.first_failure.lock().clone() {
            Some(Failure { op, chunk, reason }) => Err(Error::CompletedWithError { op, chunk, reason }),
            None => Ok(()),
        }
    }

    pub fn first_failure(&self) -> Option<Failure> {
        self.first_failure.lock().clone()
    }

    /// Handles registered so far that have not been signaled.
    pub fn outstanding(&self) -> usize {
        self.handles.lock().iter().filter(|handle| !handle.is_signaled()).count()
    }

    /// Number of handles registered so far.
    pub fn registered(&self) -> usize {
        self.handles.lock().len()
    }

    /// Block until every registered handle has settled, then report the
    /// first failure, if any.
    pub fn drain(&self) -> Result<()> {
        let handles = self.handles.lock().clone();
        for handle in &handles {
            // Waiters wake before callbacks run, so record from the status too.
            if let CommandStatus::Failed(reason) = handle.event.wait_settled() {
                record_failure(&self.first_failure, handle.op, handle.chunk, &reason);
            }
        }
        debug!(handles = handles.len(), "drained");
        self.check()
    }
}
