//! Single-shot execution: one load, one task launch, one store.
//!
//! Each step waits for the previous one on the host, like an in-order queue
//! followed by a finish. Used as the non-overlapped baseline and to run the
//! systolic `mmult` kernel, which works on whole matrices.

use std::sync::Arc;
use std::time::{Duration, Instant};

use snafu::{ResultExt, ensure};
use tandem_device::{Buffer, ExecutionContext, KernelArgs, RowMultiply, SystolicMultiply, Transfer};
use tracing::{debug, info};

use crate::error::{DeviceSnafu, InvalidProblemSnafu, Result, SubmissionSnafu};
use crate::job::MatMulJob;
use crate::reference::Matrix;
use crate::tracker::{DependencyTracker, Handle, OpKind};

/// Device-resident operands of a single-shot launch.
#[derive(Debug, Clone)]
pub struct TaskBuffers {
    /// Rows of A and C held on the device.
    pub rows: usize,
    pub a: Buffer,
    pub b: Buffer,
    pub c: Buffer,
    pub args: KernelArgs,
}

#[derive(Debug, Clone)]
pub struct TaskRun {
    pub result: Matrix,
    /// Execution time of the kernel alone.
    pub kernel_time: Option<Duration>,
    pub elapsed: Duration,
}

/// Allocate device buffers for `job` and bind them in the argument order of
/// the context's kernel.
///
/// `b` holds B as-is for `mmult` and transposed for `lmult`.
pub fn prepare(ctx: &ExecutionContext, job: &MatMulJob) -> Result<TaskBuffers> {
    let (m, _, _) = job.dims();
    bind(ctx, job, m)
}

/// Like [`prepare`], but holds only the first `rows` rows of A and C.
///
/// This is the device footprint of one pipeline chunk: a row slice of A,
/// the whole of Bᵀ and a row slice of C. Only `lmult` works on row slices.
pub fn prepare_chunk(ctx: &ExecutionContext, job: &MatMulJob, rows: usize) -> Result<TaskBuffers> {
    let kernel = ctx.kernel.name();
    ensure!(
        kernel == RowMultiply::NAME,
        InvalidProblemSnafu { reason: format!("kernel '{kernel}' cannot run on a row slice") }
    );
    let (m, _, _) = job.dims();
    bind(ctx, job, rows.min(m))
}

fn bind(ctx: &ExecutionContext, job: &MatMulJob, rows: usize) -> Result<TaskBuffers> {
    let (_, k, n) = job.dims();
    let alloc = |len| ctx.allocator.alloc(len).context(DeviceSnafu);
    let (a, b, c) = (alloc(rows * k)?, alloc(k * n)?, alloc(rows * n)?);

    let args = match ctx.kernel.name() {
        SystolicMultiply::NAME => KernelArgs::new().buffer(a.clone()).buffer(b.clone()).buffer(c.clone()),
        RowMultiply::NAME => KernelArgs::new().buffer(c.clone()).buffer(a.clone()).buffer(b.clone()),
        other => return InvalidProblemSnafu { reason: format!("no task binding for kernel '{other}'") }.fail(),
    };
    let args = args.scalar(rows).scalar(k).scalar(n);
    Ok(TaskBuffers { rows, a, b, c, args })
}

/// Host-side contents for `buffers.b`.
fn b_operand(ctx: &ExecutionContext, job: &MatMulJob) -> Vec<i32> {
    if ctx.kernel.name() == RowMultiply::NAME {
        job.b().transpose().into_vec()
    } else {
        job.b().as_slice().to_vec()
    }
}

/// Copy both inputs of `job` into `buffers` and wait for the copy.
///
/// Only the rows of A that `buffers` holds are copied.
pub fn load_inputs(
    ctx: &ExecutionContext,
    tracker: &DependencyTracker,
    job: &MatMulJob,
    buffers: &TaskBuffers,
) -> Result<()> {
    let (_, k, _) = job.dims();
    let a_rows = job.a().as_slice()[..buffers.rows * k].to_vec();
    let transfers = vec![
        Transfer::new(Buffer::from_vec(a_rows), buffers.a.clone()).context(DeviceSnafu)?,
        Transfer::new(Buffer::from_vec(b_operand(ctx, job)), buffers.b.clone()).context(DeviceSnafu)?,
    ];
    let load = submit(tracker, OpKind::Load, ctx.queue.enqueue_write(transfers, &[]))?;
    tracker.wait(&load)
}

/// Launch the kernel once and wait for it.
pub fn launch(ctx: &ExecutionContext, tracker: &DependencyTracker, buffers: &TaskBuffers) -> Result<Handle> {
    let task = submit(tracker, OpKind::Task, ctx.queue.enqueue_task(Arc::clone(&ctx.kernel), buffers.args.clone()))?;
    tracker.wait(&task)?;
    Ok(task)
}

fn submit(
    tracker: &DependencyTracker,
    op: OpKind,
    submitted: tandem_device::Result<tandem_device::Event>,
) -> Result<Handle> {
    let handle = tracker.register(op, None);
    match submitted {
        Ok(event) => {
            tracker.bind(&handle, &event);
            Ok(handle)
        }
        Err(source) => {
            tracker.fail(&handle, source.to_string());
            Err(source).context(SubmissionSnafu { op, chunk: None })
        }
    }
}

/// Multiply `job` with a single kernel launch.
pub fn run_single_shot(ctx: &ExecutionContext, job: &MatMulJob) -> Result<TaskRun> {
    let started = Instant::now();
    let (m, _, n) = job.dims();
    let tracker = DependencyTracker::new();

    let buffers = prepare(ctx, job)?;
    load_inputs(ctx, &tracker, job, &buffers)?;
    let task = launch(ctx, &tracker, &buffers)?;
    let kernel_time = task.event().profile().duration();

    let host_c = Buffer::zeroed(m * n);
    let store = submit(
        &tracker,
        OpKind::Store,
        Transfer::new(buffers.c.clone(), host_c.clone())
            .and_then(|transfer| ctx.queue.enqueue_read(vec![transfer], &[])),
    )?;
    tracker.wait(&store)?;
    ctx.queue.finish().context(DeviceSnafu)?;
    debug!(handles = tracker.registered(), "single shot drained");

    let elapsed = started.elapsed();
    info!(kernel = ctx.kernel.name(), ?elapsed, ?kernel_time, "single shot finished");
    Ok(TaskRun { result: Matrix::new(m, n, host_c.to_vec())?, kernel_time, elapsed })
}
