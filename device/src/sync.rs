//! Completion events for asynchronous commands.
//!
//! Every command submitted to a [`CommandQueue`](crate::queue::CommandQueue)
//! returns an [`Event`]. An event moves monotonically through
//! `Queued → Submitted → Running` and ends in exactly one terminal status,
//! `Complete` or `Failed`. Terminal statuses never change.
//!
//! # Design
//!
//! - State lives behind a `parking_lot::Mutex`, waiters park on a `Condvar`
//! - Callbacks registered with [`Event::on_complete`] run exactly once, on the
//!   thread that performs the terminal transition (or immediately, on the
//!   registering thread, if the event is already terminal)
//! - Profiling timestamps are always recorded
//!
//! # Example
//!
//! ```ignore
//! let event = Event::user();
//!
//! // Producer thread
//! event.complete();
//!
//! // Consumer thread
//! event.wait()?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CommandFailedSnafu, Result, WaitTimeoutSnafu};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Type of command an event tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Host to device transfer.
    WriteBuffer,
    /// Device to host transfer.
    ReadBuffer,
    /// Kernel launch with a wait-list.
    Kernel,
    /// Single-shot kernel launch.
    Task,
    /// Host-controlled event.
    User,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteBuffer => "buffer write",
            Self::ReadBuffer => "buffer read",
            Self::Kernel => "kernel",
            Self::Task => "task",
            Self::User => "user event",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    /// Terminal failure with a human-readable reason.
    Failed(Arc<str>),
}

impl CommandStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Submitted => 1,
            Self::Running => 2,
            Self::Complete | Self::Failed(_) => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Submitted => "Submitted",
            Self::Running => "Executing",
            Self::Complete => "Completed",
            Self::Failed(_) => "Failed",
        }
    }
}

/// Profiling timestamps of a command.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub queued: Instant,
    pub submitted: Option<Instant>,
    pub started: Option<Instant>,
    pub ended: Option<Instant>,
}

impl Profile {
    /// Execution time (start to end), once the command has settled.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.ended?.saturating_duration_since(self.started?))
    }

    /// Time spent waiting on dependencies and for a worker.
    pub fn queued_to_start(&self) -> Option<Duration> {
        Some(self.started?.saturating_duration_since(self.queued))
    }
}

type Callback = Box<dyn FnOnce(&Event) + Send>;

struct EventState {
    status: CommandStatus,
    profile: Profile,
    callbacks: Vec<Callback>,
}

struct EventInner {
    id: u64,
    kind: CommandKind,
    state: Mutex<EventState>,
    condvar: Condvar,
}

/// Asynchronously signaled completion token.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(kind: CommandKind) -> Self {
        let state = EventState {
            status: CommandStatus::Queued,
            profile: Profile { queued: Instant::now(), submitted: None, started: None, ended: None },
            callbacks: Vec::new(),
        };
        Self {
            inner: Arc::new(EventInner {
                id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                state: Mutex::new(state),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Create an event signaled by the host rather than by a command.
    pub fn user() -> Self {
        Self::new(CommandKind::User)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> CommandKind {
        self.inner.kind
    }

    pub fn status(&self) -> CommandStatus {
        self.inner.state.lock().status.clone()
    }

    pub fn profile(&self) -> Profile {
        self.inner.state.lock().profile
    }

    /// Non-blocking poll: true once the event is complete or failed.
    pub fn is_signaled(&self) -> bool {
        self.inner.state.lock().status.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.inner.state.lock().status, CommandStatus::Complete)
    }

    /// Failure reason, if the event settled with an error.
    pub fn failure(&self) -> Option<Arc<str>> {
        match &self.inner.state.lock().status {
            CommandStatus::Failed(reason) => Some(Arc::clone(reason)),
            _ => None,
        }
    }

    pub(crate) fn mark_submitted(&self) -> bool {
        self.advance(CommandStatus::Submitted)
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.advance(CommandStatus::Running)
    }

    fn advance(&self, to: CommandStatus) -> bool {
        let mut state = self.inner.state.lock();
        if to.rank() <= state.status.rank() {
            return false;
        }
        let now = Instant::now();
        match to {
            CommandStatus::Submitted => state.profile.submitted = Some(now),
            CommandStatus::Running => state.profile.started = Some(now),
            _ => {}
        }
        state.status = to;
        true
    }

    /// Mark the event complete. Returns `false` if it had already settled.
    pub fn complete(&self) -> bool {
        self.settle(CommandStatus::Complete)
    }

    /// Mark the event failed. Returns `false` if it had already settled.
    pub fn fail(&self, reason: impl Into<Arc<str>>) -> bool {
        self.settle(CommandStatus::Failed(reason.into()))
    }

    fn settle(&self, status: CommandStatus) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            let now = Instant::now();
            state.profile.submitted.get_or_insert(now);
            state.profile.started.get_or_insert(now);
            state.profile.ended = Some(now);
            state.status = status;
            std::mem::take(&mut state.callbacks)
        };

        self.inner.condvar.notify_all();
        for callback in callbacks {
            callback(self);
        }
        true
    }

    /// Run `callback` once the event settles.
    ///
    /// Runs immediately on the calling thread if the event already settled.
    pub fn on_complete(&self, callback: impl FnOnce(&Event) + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            if !state.status.is_terminal() {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Block until the event settles and return its terminal status.
    pub fn wait_settled(&self) -> CommandStatus {
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            self.inner.condvar.wait(&mut state);
        }
        state.status.clone()
    }

    /// Block until the event settles; failure is reported as an error.
    pub fn wait(&self) -> Result<()> {
        let status = self.wait_settled();
        self.check(status)
    }

    /// Like [`Event::wait`], but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let status = {
            let mut state = self.inner.state.lock();
            while !state.status.is_terminal() {
                let result = self.inner.condvar.wait_until(&mut state, deadline);
                if result.timed_out() && !state.status.is_terminal() {
                    return WaitTimeoutSnafu {
                        kind: self.kind().to_string(),
                        id: self.id(),
                        waited_ms: timeout.as_millis() as u64,
                    }
                    .fail();
                }
            }
            state.status.clone()
        };
        self.check(status)
    }

    fn check(&self, status: CommandStatus) -> Result<()> {
        match status {
            CommandStatus::Failed(reason) => {
                CommandFailedSnafu { kind: self.kind().to_string(), id: self.id(), reason: reason.to_string() }.fail()
            }
            _ => Ok(()),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("status", &self.status())
            .finish()
    }
}
