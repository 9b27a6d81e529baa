use std::time::Duration;

use tandem_device::{DeviceSpec, Error as DeviceError, KernelImage, Provisioner, RowMultiply, SystolicMultiply};

use super::{config, context};
use crate::benchmark::{BenchmarkConfig, benchmark_chunk, benchmark_host, benchmark_task};
use crate::driver::run_pipeline;
use crate::error::Error;
use crate::job::MatMulJob;
use crate::reference::multiply;

#[test]
fn test_default_config() {
    let config = BenchmarkConfig::default();
    assert_eq!(config.warmup_runs, 0);
    assert_eq!(config.timing_runs, 5);
    assert!(!config.take_minimum);
}

#[test]
fn test_benchmark_task() {
    let ctx = context(SystolicMultiply::NAME);
    let job = MatMulJob::random_square(32, 9);
    let config = BenchmarkConfig { warmup_runs: 1, timing_runs: 3, take_minimum: true };

    let result = benchmark_task(&ctx, &job, &config).unwrap();

    assert_eq!(result.runs.len(), 3);
    assert!(result.min <= result.mean);
    assert_eq!(result.timing(true), result.min);
    assert_eq!(result.timing(false), result.mean);
}

#[test]
fn test_benchmark_host() {
    let job = MatMulJob::random_square(8, 2);
    let config = BenchmarkConfig::default();

    let (product, result) = benchmark_host(&config, || {
        std::thread::sleep(Duration::from_micros(100));
        multiply(job.a(), job.b()).unwrap()
    });

    assert_eq!(product, job.expected().unwrap());
    assert_eq!(result.runs.len(), 5);
    assert!(result.min >= Duration::from_micros(100));
}

#[test]
fn test_benchmark_chunk_fits_where_pipeline_fits() {
    // A 16x16 problem needs 3 KiB on the device in one piece. Two one-row
    // slot sets, static Bᵀ and one benchmark chunk need 2432 bytes.
    let image = KernelImage::simulated("test");
    let device = DeviceSpec::builder().memory_limit(2560).build();
    let ctx = Provisioner::new(&image, RowMultiply::NAME).provision(&[device]).unwrap();
    let job = MatMulJob::random_square(16, 3);

    let run = run_pipeline(&ctx, config(2, 1), &job).unwrap();
    assert_eq!(run.result, job.expected().unwrap());

    let result = benchmark_chunk(&ctx, &job, 1, &BenchmarkConfig::default()).unwrap();
    assert_eq!(result.runs.len(), 5);

    let error = benchmark_task(&ctx, &job, &BenchmarkConfig::default()).unwrap_err();
    assert!(matches!(error, Error::Device { source: DeviceError::OutOfDeviceMemory { .. } }), "{error}");
}

#[test]
fn test_benchmark_chunk_needs_row_kernel() {
    let ctx = context(SystolicMultiply::NAME);
    let job = MatMulJob::random_square(8, 1);

    let error = benchmark_chunk(&ctx, &job, 2, &BenchmarkConfig::default()).unwrap_err();

    assert!(matches!(error, Error::InvalidProblem { .. }), "{error}");
}
