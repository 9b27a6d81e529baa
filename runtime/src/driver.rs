//! Overlapped double-buffered submission pipeline.
//!
//! The driver walks the chunks of a [`MatMulJob`] in ascending order. Chunk
//! `i` uses slot `g = i mod k` of every role and goes through
//!
//! ```text
//! Idle → AwaitingSlot → Loading → Computing → Storing → Done
//! ```
//!
//! The submitting thread blocks only at `AwaitingSlot`, and only for
//! `i ≥ k`: there it waits for the Store of chunk `i - k`, the last consumer
//! of the slot. Every other ordering constraint travels inside the
//! submission as a wait-list, so the accelerator is free to overlap the Store
//! of chunk `i` with the Load and Compute of chunk `i + 1`.
//!
//! ```text
//! | Load 0 | Load 1 | Load 2 ...
//!          | Compute 0 | Compute 1 | ...
//!                      | Store 0 | Store 1 | ...
//! ```
//!
//! The static right-hand input is loaded once before the loop and appears
//! in the wait-list of every Compute.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tandem_device::{Buffer, CommandQueue, Event, ExecutionContext, KernelArgs, RowMultiply, Transfer};
use tracing::{debug, info, trace, warn};

use crate::chunk::{Chunk, ChunkPlan};
use crate::config::PipelineConfig;
use crate::error::{DeviceSnafu, Error, InvalidProblemSnafu, Result, SubmissionSnafu};
use crate::job::MatMulJob;
use crate::reference::Matrix;
use crate::reporter::{CompletionRecord, CompletionReporter, Summary};
use crate::slot_pool::{Role, SlotPool};
use crate::tracker::{DependencyTracker, Handle, OpKind};

/// Per-generation state of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationState {
    Idle,
    AwaitingSlot,
    Loading,
    Computing,
    Storing,
    Done,
}

impl GenerationState {
    /// Whether `self → to` is an edge of the state machine.
    pub fn can_advance_to(self, to: Self) -> bool {
        use GenerationState::*;
        matches!(
            (self, to),
            (Idle, AwaitingSlot)
                | (AwaitingSlot, Loading)
                | (Loading, Computing)
                | (Computing, Storing)
                | (Storing, Done)
        )
    }
}

/// One state change of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub chunk: usize,
    pub generation: usize,
    pub from: GenerationState,
    pub to: GenerationState,
}

/// One submitted operation, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub seq: usize,
    pub op: OpKind,
    pub chunk: Option<usize>,
    /// Slot index the operation works on; `None` for the static load.
    pub slot: Option<usize>,
    pub handle: u64,
    /// Handles the operation waits for.
    pub wait_list: SmallVec<[u64; 2]>,
    pub submitted_at: Instant,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: Matrix,
    pub submissions: Vec<SubmissionRecord>,
    pub transitions: Vec<Transition>,
    pub completions: Vec<CompletionRecord>,
    pub started: Instant,
    pub elapsed: Duration,
    pub chunks: usize,
    /// Chunks that had to wait for their slot at `AwaitingSlot`.
    pub backpressure_waits: usize,
}

impl PipelineRun {
    pub fn submission(&self, op: OpKind, chunk: Option<usize>) -> Option<&SubmissionRecord> {
        self.submissions.iter().find(|record| record.op == op && record.chunk == chunk)
    }

    pub fn count(&self, op: OpKind) -> usize {
        self.submissions.iter().filter(|record| record.op == op).count()
    }

    pub fn completion(&self, op: OpKind, chunk: Option<usize>) -> Option<&CompletionRecord> {
        self.completions.iter().find(|record| record.op == op && record.chunk == chunk)
    }

    pub fn summary(&self) -> Summary {
        Summary::from_records(&self.completions)
    }
}

/// Host buffers and static device input shared by every chunk.
struct Staging {
    host_a: Buffer,
    host_c: Buffer,
    device_b: Buffer,
    static_load: Handle,
}

pub struct PipelineDriver<'a> {
    ctx: &'a ExecutionContext,
    config: PipelineConfig,
    tracker: DependencyTracker,
    reporter: CompletionReporter,
    states: Vec<GenerationState>,
    submissions: Vec<SubmissionRecord>,
    transitions: Vec<Transition>,
    backpressure_waits: usize,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(ctx: &'a ExecutionContext, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let kernel = ctx.kernel.name();
        ensure!(
            kernel == RowMultiply::NAME,
            InvalidProblemSnafu {
                reason: format!("pipeline needs the '{}' kernel, context has '{kernel}'", RowMultiply::NAME)
            }
        );

        Ok(Self {
            ctx,
            tracker: DependencyTracker::with_deadline(config.wait_timeout),
            reporter: CompletionReporter::new(config.queue_name.clone(), config.trace_events),
            states: vec![GenerationState::Idle; config.slots],
            submissions: Vec::new(),
            transitions: Vec::new(),
            backpressure_waits: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Submissions made so far, including those of an aborted run.
    pub fn submissions(&self) -> &[SubmissionRecord] {
        &self.submissions
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Current state of generation `g`.
    pub fn state(&self, generation: usize) -> Option<GenerationState> {
        self.states.get(generation).copied()
    }

    /// Run `job` to completion.
    ///
    /// On error every outstanding operation is drained before returning,
    /// except after a wait timeout, where the stuck operation may never
    /// settle.
    pub fn run(&mut self, job: &MatMulJob) -> Result<PipelineRun> {
        self.reset();
        let started = Instant::now();
        let (m, _, n) = job.dims();
        let plan = ChunkPlan::new(m, self.config.rows_per_chunk);
        info!(m, n, chunks = plan.len(), slots = self.config.slots, "starting pipeline");

        let host_c = match self.execute(job, &plan) {
            Ok(host_c) => host_c,
            Err(error) => {
                self.abort(&error);
                return Err(error);
            }
        };

        let result = Matrix::new(m, n, host_c.to_vec())?;
        let elapsed = started.elapsed();
        info!(?elapsed, submissions = self.submissions.len(), "pipeline finished");

        Ok(PipelineRun {
            result,
            submissions: self.submissions.clone(),
            transitions: self.transitions.clone(),
            completions: self.reporter.take(),
            started,
            elapsed,
            chunks: plan.len(),
            backpressure_waits: self.backpressure_waits,
        })
    }

    fn reset(&mut self) {
        self.tracker = DependencyTracker::with_deadline(self.config.wait_timeout);
        self.reporter = CompletionReporter::new(self.config.queue_name.clone(), self.config.trace_events);
        self.states.fill(GenerationState::Idle);
        self.submissions.clear();
        self.transitions.clear();
        self.backpressure_waits = 0;
    }

    fn execute(&mut self, job: &MatMulJob, plan: &ChunkPlan) -> Result<Buffer> {
        let (m, k, n) = job.dims();
        let rows = plan.rows_per_chunk().min(m);

        let mut pool = SlotPool::new(
            self.ctx.allocator.as_ref(),
            self.config.slots,
            &[(Role::InputA, rows * k), (Role::OutputC, rows * n)],
        )?;
        let staging = self.stage(job)?;

        for chunk in plan.iter() {
            self.tracker.check()?;
            self.issue(&mut pool, &staging, &chunk, k, n)?;
        }

        self.ctx.queue.flush().context(DeviceSnafu)?;
        self.tracker.drain()?;
        self.ctx.queue.finish().context(DeviceSnafu)?;
        Ok(staging.host_c)
    }

    /// Allocate host buffers and load the static input once.
    fn stage(&mut self, job: &MatMulJob) -> Result<Staging> {
        let (m, k, n) = job.dims();
        let host_a = Buffer::from_vec(job.a().as_slice().to_vec());
        let host_b_t = Buffer::from_vec(job.b().transpose().into_vec());
        let host_c = Buffer::zeroed(m * n);
        let device_b = self.ctx.allocator.alloc(k * n).context(DeviceSnafu)?;

        let transfer = Transfer::new(host_b_t, device_b.clone()).context(DeviceSnafu)?;
        let static_load =
            self.submit(OpKind::StaticLoad, None, None, &[], |queue, wait| queue.enqueue_write(vec![transfer], wait))?;

        Ok(Staging { host_a, host_c, device_b, static_load })
    }

    /// Drive one chunk from `Idle` to `Done`.
    fn issue(&mut self, pool: &mut SlotPool, staging: &Staging, chunk: &Chunk, k: usize, n: usize) -> Result<()> {
        let generation = chunk.index % pool.depth();
        self.states[generation] = GenerationState::Idle;

        // Idle → AwaitingSlot
        self.advance(chunk, generation, GenerationState::AwaitingSlot);
        let slot_a = pool.acquire(Role::InputA, chunk.index);
        let slot_c = pool.acquire(Role::OutputC, chunk.index);
        let predecessor = pool.last_consumer_handle(&slot_a);

        // AwaitingSlot → Loading: the only blocking point of the loop.
        if let Some(predecessor) = &predecessor {
            debug!(chunk = chunk.index, slot = slot_a.index, waiting_on = predecessor.id(), "awaiting slot");
            self.backpressure_waits += 1;
            self.tracker.wait(predecessor).map_err(|error| self.prefer_first_failure(error))?;
        }
        self.tracker.check()?;
        self.advance(chunk, generation, GenerationState::Loading);

        let (a_len, c_len) = (chunk.len(k), chunk.len(n));
        let device_a = pool.buffer(&slot_a)?.view(0, a_len).context(DeviceSnafu)?;
        let device_c = pool.buffer(&slot_c)?.view(0, c_len).context(DeviceSnafu)?;
        let load_transfer =
            Transfer::new(staging.host_a.view(chunk.offset(k), a_len).context(DeviceSnafu)?, device_a.clone())
                .context(DeviceSnafu)?;
        let store_transfer =
            Transfer::new(device_c.clone(), staging.host_c.view(chunk.offset(n), c_len).context(DeviceSnafu)?)
                .context(DeviceSnafu)?;

        let wait: SmallVec<[Handle; 2]> = predecessor.into_iter().collect();
        let load = self.submit(OpKind::Load, Some(chunk.index), Some(slot_a.index), &wait, |queue, wait| {
            queue.enqueue_write(vec![load_transfer], wait)
        })?;

        // Loading → Computing
        self.advance(chunk, generation, GenerationState::Computing);
        let kernel = Arc::clone(&self.ctx.kernel);
        let args = KernelArgs::new()
            .buffer(device_c)
            .buffer(device_a)
            .buffer(staging.device_b.clone())
            .scalar(chunk.rows)
            .scalar(k)
            .scalar(n);
        let compute = self.submit(
            OpKind::Compute,
            Some(chunk.index),
            Some(slot_a.index),
            &[load, staging.static_load.clone()],
            |queue, wait| queue.enqueue_kernel(kernel, args, wait),
        )?;

        // Computing → Storing
        self.advance(chunk, generation, GenerationState::Storing);
        let store = self.submit(OpKind::Store, Some(chunk.index), Some(slot_c.index), &[compute], |queue, wait| {
            queue.enqueue_read(vec![store_transfer], wait)
        })?;

        // Storing → Done
        pool.record_consumer(&slot_a, store.clone());
        pool.record_consumer(&slot_c, store);
        self.advance(chunk, generation, GenerationState::Done);
        Ok(())
    }

    fn advance(&mut self, chunk: &Chunk, generation: usize, to: GenerationState) {
        let from = self.states[generation];
        debug_assert!(from.can_advance_to(to), "invalid transition {from:?} → {to:?} for chunk {}", chunk.index);
        trace!(chunk = chunk.index, generation, ?from, ?to, "transition");
        self.states[generation] = to;
        self.transitions.push(Transition { chunk: chunk.index, generation, from, to });
    }

    /// Register a handle, submit through `enqueue`, and bind the two.
    ///
    /// A failed submission settles the handle with an error before the
    /// error is returned.
    fn submit(
        &mut self,
        op: OpKind,
        chunk: Option<usize>,
        slot: Option<usize>,
        wait: &[Handle],
        enqueue: impl FnOnce(&dyn CommandQueue, &[Event]) -> tandem_device::Result<Event>,
    ) -> Result<Handle> {
        let handle = self.tracker.register(op, chunk);
        let wait_list: SmallVec<[Event; 2]> = wait.iter().map(|handle| handle.event().clone()).collect();

        let event = match enqueue(self.ctx.queue.as_ref(), &wait_list) {
            Ok(event) => event,
            Err(source) => {
                self.tracker.fail(&handle, source.to_string());
                return Err(source).context(SubmissionSnafu { op, chunk });
            }
        };
        // Report before binding: the record is sent before the handle signals.
        self.reporter.observe(&handle, &event);
        self.tracker.bind(&handle, &event);

        let record = SubmissionRecord {
            seq: self.submissions.len(),
            op,
            chunk,
            slot,
            handle: handle.id(),
            wait_list: wait.iter().map(Handle::id).collect(),
            submitted_at: Instant::now(),
        };
        debug!(
            seq = record.seq,
            %op,
            ?chunk,
            ?slot,
            handle = record.handle,
            wait_list = ?record.wait_list,
            "submitted"
        );
        self.submissions.push(record);
        Ok(handle)
    }

    /// Report the operation that failed first rather than a dependent one.
    fn prefer_first_failure(&self, error: Error) -> Error {
        match (&error, self.tracker.first_failure()) {
            (Error::CompletedWithError { .. }, Some(first)) => {
                Error::CompletedWithError { op: first.op, chunk: first.chunk, reason: first.reason }
            }
            _ => error,
        }
    }

    fn abort(&self, error: &Error) {
        warn!(%error, outstanding = self.tracker.outstanding(), "aborting pipeline");
        if matches!(error, Error::WaitTimeout { .. }) {
            return;
        }
        if let Err(error) = self.ctx.queue.finish() {
            warn!(%error, "failed to drain queue");
        }
        // Failures were already reported; only settle the handles.
        let _ = self.tracker.drain();
    }
}

/// Run `job` on `ctx` with `config`.
pub fn run_pipeline(ctx: &ExecutionContext, config: PipelineConfig, job: &MatMulJob) -> Result<PipelineRun> {
    PipelineDriver::new(ctx, config)?.run(job)
}
