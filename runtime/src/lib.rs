//! Overlapped submission pipeline for chunked matrix multiply.
//!
//! A large `C = A × B` is split into row chunks. Each chunk is loaded,
//! computed and stored through a small pool of reusable device buffers, so
//! the transfers of one chunk overlap the compute of its neighbours.
//!
//! # Pipeline
//!
//! The [`driver`] module holds the submission state machine. It relies on
//! [`slot_pool`] for buffer reuse, [`tracker`] for completion handles and
//! [`reporter`] for per-operation timing.
//!
//! # Baselines
//!
//! [`task`] runs the same product as a single kernel launch and
//! [`reference`] computes it on the host. [`benchmark`] times both.

pub mod benchmark;
pub mod chunk;
pub mod config;
pub mod driver;
pub mod error;
pub mod job;
pub mod reference;
pub mod reporter;
pub mod slot_pool;
pub mod task;
pub mod tracker;

#[cfg(test)]
pub mod test;

pub use benchmark::{BenchmarkConfig, BenchmarkResult, benchmark_chunk, benchmark_host, benchmark_task};
pub use chunk::{Chunk, ChunkPlan};
pub use config::{MAX_SLOTS, PipelineConfig};
pub use driver::{GenerationState, PipelineDriver, PipelineRun, SubmissionRecord, Transition, run_pipeline};
pub use error::*;
pub use job::MatMulJob;
pub use reference::{Matrix, Verification, blocked_multiply, multiply, verify};
pub use reporter::{CompletionRecord, CompletionReporter, OpStats, Summary};
pub use slot_pool::{Role, SlotPool, SlotRef};
pub use task::{TaskRun, run_single_shot};
pub use tracker::{DependencyTracker, Failure, Handle, OpKind};
