//! Out-of-order command submission.
//!
//! A [`CommandQueue`] accepts transfers and kernel launches, each with an
//! explicit wait-list, and returns an [`Event`] per command. Commands are
//! not ordered by submission: the wait-list is the only ordering guarantee.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bon::bon;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use snafu::{ResultExt, ensure};
use tracing::{debug, trace};

use crate::buffer::Transfer;
use crate::error::{DependencyFailedSnafu, Error, QueueClosedSnafu, Result, WorkerPoolSnafu};
use crate::kernel::{Kernel, KernelArgs};
use crate::sync::{CommandKind, Event};

/// Asynchronous command submission interface.
///
/// Every `enqueue_*` call either returns an event that will eventually
/// settle, or fails synchronously without leaving anything behind.
pub trait CommandQueue: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Host to device transfers, started once every event in `wait_list` settled.
    fn enqueue_write(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> Result<Event>;

    fn enqueue_kernel(&self, kernel: Arc<dyn Kernel>, args: KernelArgs, wait_list: &[Event]) -> Result<Event>;

    /// Device to host transfers.
    fn enqueue_read(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> Result<Event>;

    /// Single-shot kernel launch with no dependencies.
    fn enqueue_task(&self, kernel: Arc<dyn Kernel>, args: KernelArgs) -> Result<Event>;

    /// Issue every queued command to the device.
    fn flush(&self) -> Result<()>;

    /// Block until every command submitted so far has settled.
    fn finish(&self) -> Result<()>;
}

/// Identity of a command as seen by a [`CommandHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub kind: CommandKind,
    /// Position among commands of the same kind on this queue, from 0.
    pub ordinal: u64,
    /// Id of the event tracking the command.
    pub event: u64,
}

/// Observer of command submission and execution.
pub trait CommandHook: Send + Sync + fmt::Debug {
    /// Runs synchronously inside `enqueue_*`. An error rejects the submission.
    fn on_submit(&self, _info: &CommandInfo) -> Result<()> {
        Ok(())
    }

    /// Runs on the worker right before the command executes. An error fails
    /// the command after it started.
    fn before_execute(&self, _info: &CommandInfo) -> Result<()> {
        Ok(())
    }
}

enum Payload {
    Transfer(Vec<Transfer>),
    Launch { kernel: Arc<dyn Kernel>, args: KernelArgs },
}

impl Payload {
    fn execute(&self) -> Result<()> {
        match self {
            Payload::Transfer(transfers) => transfers.iter().try_for_each(Transfer::execute),
            Payload::Launch { kernel, args } => kernel.launch(args),
        }
    }
}

/// A submitted command waiting for its dependencies or a worker.
struct Command {
    info: CommandInfo,
    payload: Payload,
    event: Event,
    dependencies: Vec<Event>,
    hook: Option<Arc<dyn CommandHook>>,
    pool: Arc<ThreadPool>,
}

impl Command {
    /// Dispatch once every dependency has settled.
    fn arm(self: Arc<Self>) {
        if self.dependencies.is_empty() {
            self.dispatch();
            return;
        }

        let remaining = Arc::new(AtomicUsize::new(self.dependencies.len()));
        for dependency in &self.dependencies {
            let command = Arc::clone(&self);
            let remaining = Arc::clone(&remaining);
            dependency.on_complete(move |_| {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    command.dispatch();
                }
            });
        }
    }

    fn dispatch(self: Arc<Self>) {
        let pool = Arc::clone(&self.pool);
        pool.spawn(move || self.run());
    }

    fn run(&self) {
        let failed = self.dependencies.iter().find_map(|dep| dep.failure().map(|reason| (dep.id(), reason)));
        if let Some((dependency, reason)) = failed {
            let error: Error = DependencyFailedSnafu { dependency, reason: reason.to_string() }.build();
            trace!(event = self.info.event, kind = %self.info.kind, %error, "skipping command");
            self.event.fail(error.to_string());
            return;
        }

        self.event.mark_running();
        let result = match &self.hook {
            Some(hook) => hook.before_execute(&self.info).and_then(|()| self.payload.execute()),
            None => self.payload.execute(),
        };

        match result {
            Ok(()) => {
                self.event.complete();
            }
            Err(error) => {
                debug!(event = self.info.event, kind = %self.info.kind, %error, "command failed");
                self.event.fail(error.to_string());
            }
        }
    }
}

/// Out-of-order queue executing commands on a `rayon` thread pool.
///
/// A command starts as soon as every event in its wait-list has settled. A
/// command whose dependency failed is failed without running.
pub struct OutOfOrderQueue {
    name: String,
    pool: Arc<ThreadPool>,
    outstanding: Mutex<Vec<Event>>,
    ordinals: Mutex<HashMap<CommandKind, u64>>,
    hook: Option<Arc<dyn CommandHook>>,
    closed: AtomicBool,
}

impl fmt::Debug for OutOfOrderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutOfOrderQueue")
            .field("name", &self.name)
            .field("workers", &self.pool.current_num_threads())
            .field("outstanding", &self.outstanding.lock().len())
            .finish()
    }
}

#[bon]
impl OutOfOrderQueue {
    /// Create a queue backed by `compute_units` worker threads.
    #[builder]
    pub fn new(
        #[builder(default = String::from("ooo_queue"))] name: String,
        #[builder(default = 4)] compute_units: usize,
        hook: Option<Arc<dyn CommandHook>>,
    ) -> Result<Self> {
        let thread_prefix = name.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(compute_units.max(1))
            .thread_name(move |i| format!("{thread_prefix}-{i}"))
            .build()
            .context(WorkerPoolSnafu)?;

        Ok(Self {
            name,
            pool: Arc::new(pool),
            outstanding: Mutex::new(Vec::new()),
            ordinals: Mutex::new(HashMap::new()),
            hook,
            closed: AtomicBool::new(false),
        })
    }
}

impl OutOfOrderQueue {
    /// Reject every later submission with `QueueClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Number of commands that have not settled yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().iter().filter(|event| !event.is_signaled()).count()
    }

    fn next_ordinal(&self, kind: CommandKind) -> u64 {
        let mut ordinals = self.ordinals.lock();
        let slot = ordinals.entry(kind).or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        ordinal
    }

    fn enqueue(&self, kind: CommandKind, payload: Payload, wait_list: &[Event]) -> Result<Event> {
        ensure!(!self.closed.load(Ordering::Acquire), QueueClosedSnafu { queue: self.name.clone() });

        let event = Event::new(kind);
        let info = CommandInfo { kind, ordinal: self.next_ordinal(kind), event: event.id() };
        if let Some(hook) = &self.hook {
            hook.on_submit(&info)?;
        }

        {
            let mut outstanding = self.outstanding.lock();
            if outstanding.len() >= 64 {
                outstanding.retain(|event| !event.is_signaled());
            }
            outstanding.push(event.clone());
        }

        debug!(
            queue = %self.name,
            event = info.event,
            kind = %kind,
            ordinal = info.ordinal,
            wait_list = ?wait_list.iter().map(Event::id).collect::<Vec<_>>(),
            "enqueued command"
        );

        event.mark_submitted();
        let command = Command {
            info,
            payload,
            event: event.clone(),
            dependencies: wait_list.to_vec(),
            hook: self.hook.clone(),
            pool: Arc::clone(&self.pool),
        };
        Arc::new(command).arm();

        Ok(event)
    }
}

impl CommandQueue for OutOfOrderQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue_write(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> Result<Event> {
        self.enqueue(CommandKind::WriteBuffer, Payload::Transfer(transfers), wait_list)
    }

    fn enqueue_kernel(&self, kernel: Arc<dyn Kernel>, args: KernelArgs, wait_list: &[Event]) -> Result<Event> {
        self.enqueue(CommandKind::Kernel, Payload::Launch { kernel, args }, wait_list)
    }

    fn enqueue_read(&self, transfers: Vec<Transfer>, wait_list: &[Event]) -> Result<Event> {
        self.enqueue(CommandKind::ReadBuffer, Payload::Transfer(transfers), wait_list)
    }

    fn enqueue_task(&self, kernel: Arc<dyn Kernel>, args: KernelArgs) -> Result<Event> {
        self.enqueue(CommandKind::Task, Payload::Launch { kernel, args }, &[])
    }

    fn flush(&self) -> Result<()> {
        // Commands are issued to the pool as soon as their wait-list settles.
        trace!(queue = %self.name, outstanding = self.outstanding(), "flush");
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        let snapshot = self.outstanding.lock().clone();
        for event in &snapshot {
            event.wait_settled();
        }
        self.outstanding.lock().retain(|event| !event.is_signaled());
        debug!(queue = %self.name, drained = snapshot.len(), "finish");
        Ok(())
    }
}
