//! Kernel benchmarking.
//!
//! Times repeated single-shot launches with accelerator-side profiling, and
//! host functions with a wall clock, so the two can be compared.

use std::time::{Duration, Instant};

use tandem_device::ExecutionContext;

use crate::Result;
use crate::job::MatMulJob;
use crate::task::{TaskBuffers, launch, load_inputs, prepare, prepare_chunk};
use crate::tracker::DependencyTracker;

/// Configuration for kernel benchmarking.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of warmup runs (not timed).
    pub warmup_runs: usize,
    /// Number of timing runs.
    pub timing_runs: usize,
    /// Whether to report the minimum time (true) or the mean (false).
    pub take_minimum: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self { warmup_runs: 0, timing_runs: 5, take_minimum: false }
    }
}

/// Result of kernel benchmarking.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub min: Duration,
    pub mean: Duration,
    /// All timing measurements.
    pub runs: Vec<Duration>,
}

impl BenchmarkResult {
    fn from_runs(runs: Vec<Duration>) -> Self {
        let min = runs.iter().copied().min().unwrap_or(Duration::ZERO);
        let total: Duration = runs.iter().sum();
        let mean = total / runs.len().max(1) as u32;
        Self { min, mean, runs }
    }

    /// Get the timing value based on config preference.
    pub fn timing(&self, take_minimum: bool) -> Duration {
        if take_minimum { self.min } else { self.mean }
    }
}

/// Benchmark the context's kernel on the whole of `job`.
///
/// Inputs are loaded once. Each run launches the kernel as a task and
/// measures its execution with the event's start and end timestamps.
pub fn benchmark_task(ctx: &ExecutionContext, job: &MatMulJob, config: &BenchmarkConfig) -> Result<BenchmarkResult> {
    time_launches(ctx, job, &prepare(ctx, job)?, config)
}

/// Benchmark the `lmult` kernel on one chunk of `rows` rows of `job`.
///
/// Device memory holds the same operands as one pipeline slot set plus the
/// static input, so this fits wherever the pipeline does.
pub fn benchmark_chunk(
    ctx: &ExecutionContext,
    job: &MatMulJob,
    rows: usize,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult> {
    time_launches(ctx, job, &prepare_chunk(ctx, job, rows)?, config)
}

fn time_launches(
    ctx: &ExecutionContext,
    job: &MatMulJob,
    buffers: &TaskBuffers,
    config: &BenchmarkConfig,
) -> Result<BenchmarkResult> {
    let tracker = DependencyTracker::new();
    load_inputs(ctx, &tracker, job, buffers)?;

    for _ in 0..config.warmup_runs {
        launch(ctx, &tracker, buffers)?;
    }

    let mut runs = Vec::with_capacity(config.timing_runs);
    for _ in 0..config.timing_runs {
        let task = launch(ctx, &tracker, buffers)?;
        runs.push(task.event().profile().duration().unwrap_or_default());
    }

    Ok(BenchmarkResult::from_runs(runs))
}

/// Benchmark a host function with a wall clock. Returns the last output.
pub fn benchmark_host<T>(config: &BenchmarkConfig, mut f: impl FnMut() -> T) -> (T, BenchmarkResult) {
    for _ in 0..config.warmup_runs {
        f();
    }

    let mut output = None;
    let mut runs = Vec::with_capacity(config.timing_runs.max(1));
    for _ in 0..config.timing_runs.max(1) {
        let start = Instant::now();
        output = Some(f());
        runs.push(start.elapsed());
    }

    // timing_runs.max(1) iterations ran, so output is set.
    let output = match output {
        Some(output) => output,
        None => f(),
    };
    (output, BenchmarkResult::from_runs(runs))
}
