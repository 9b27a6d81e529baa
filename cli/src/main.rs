use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tandem_device::{ExecutionContext, KernelImage, Platform, Provisioner, SystolicMultiply};
use tandem_runtime::{
    BenchmarkConfig, BenchmarkResult, Error as PipelineError, MatMulJob, PipelineConfig, benchmark_chunk,
    benchmark_host, benchmark_task, blocked_multiply, multiply, run_pipeline, run_single_shot, verify,
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod report;

use cli::{Cli, Variant};
use report::TimingReport;

/// Tile edge of the blocked reference used for the systolic variant.
const REFERENCE_TILE: usize = 16;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env();
    if let Some(slots) = cli.slots {
        config.slots = slots;
    }
    if let Some(rows_per_chunk) = cli.rows_per_chunk {
        config.rows_per_chunk = rows_per_chunk;
    }
    if let Some(ms) = cli.wait_timeout_ms {
        config.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }
    config.trace_events |= cli.trace_events;
    config.validate()?;
    Ok(config)
}

/// Returns whether the device result matched the reference.
fn run(cli: &Cli) -> Result<bool> {
    let config = pipeline_config(cli)?;
    if cli.variant == Variant::Systolic && cli.size > SystolicMultiply::MAX_SIZE {
        bail!(
            "size {} is bigger than internal buffer size, please use a size smaller than {}",
            cli.size,
            SystolicMultiply::MAX_SIZE
        );
    }

    let image = KernelImage::load(&cli.image).map_err(|source| PipelineError::Provisioning { source })?;
    let platform = Platform::from_env();
    let ctx = match Provisioner::new(&image, cli.variant.kernel())
        .queue_name(config.queue_name.clone())
        .provision(platform.devices())
    {
        Ok(ctx) => ctx,
        Err(source) => {
            println!("Failed to program any device found, exit!");
            return Err(PipelineError::Provisioning { source }.into());
        }
    };

    let job = MatMulJob::random_square(cli.size, cli.seed);
    debug!("A:\n{}", job.a().preview(16));
    debug!("B:\n{}", job.b().preview(16));

    let once = BenchmarkConfig { timing_runs: 1, ..BenchmarkConfig::default() };
    let (gold, cpu) = benchmark_host(&once, || match cli.variant {
        Variant::Overlap => multiply(job.a(), job.b()),
        Variant::Systolic => blocked_multiply(job.a(), job.b(), REFERENCE_TILE),
    });
    let gold = gold?;
    debug!("Gold:\n{}", gold.preview(16));

    let rows_per_chunk = config.rows_per_chunk;
    let (result, pipeline_time) = match cli.variant {
        Variant::Overlap => {
            let run = run_pipeline(&ctx, config, &job).context("pipeline run aborted")?;
            let summary = run.summary();
            info!(
                chunks = run.chunks,
                submissions = run.submissions.len(),
                backpressure_waits = run.backpressure_waits,
                overlap = ?summary.overlap(),
                "pipeline done"
            );
            (run.result, Some(run.elapsed))
        }
        Variant::Systolic => (run_single_shot(&ctx, &job).context("single-shot run aborted")?.result, None),
    };

    let verification = verify(gold.as_slice(), result.as_slice());
    if !verification.is_match() {
        println!("{verification}");
    }

    let accelerator = benchmark(&ctx, &job, cli.variant, rows_per_chunk).context("benchmark failed")?;
    let mut report = TimingReport::new(accelerator.mean, cpu.mean);
    if let Some(time) = pipeline_time {
        report = report.with_row("Pipeline", time);
    }
    print!("{report}");

    let passed = verification.is_match();
    println!("TEST {}", if passed { "PASSED" } else { "FAILED" });
    Ok(passed)
}

/// Time the kernel the way the variant runs it: one chunk for the pipeline,
/// the whole problem for the single-shot task.
fn benchmark(
    ctx: &ExecutionContext,
    job: &MatMulJob,
    variant: Variant,
    rows_per_chunk: usize,
) -> tandem_runtime::Result<BenchmarkResult> {
    let config = BenchmarkConfig::default();
    match variant {
        Variant::Overlap => benchmark_chunk(ctx, job, rows_per_chunk, &config),
        Variant::Systolic => benchmark_task(ctx, job, &config),
    }
}
