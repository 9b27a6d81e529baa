//! Error types for pipeline execution.
//!
//! Provisioning, submission and completion failures abort the whole run.
//! A result mismatch is not an error: see [`crate::reference::Verification`].

use snafu::Snafu;

use crate::slot_pool::Role;
use crate::tracker::OpKind;

/// Result type for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

fn at(chunk: &Option<usize>) -> String {
    match chunk {
        Some(chunk) => format!(" of chunk {chunk}"),
        None => String::new(),
    }
}

/// Errors that can occur while running the pipeline.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No usable accelerator, or the kernel image could not be loaded.
    #[snafu(display("provisioning failed: {source}"))]
    Provisioning { source: tandem_device::Error },

    /// An operation could not be enqueued.
    #[snafu(display("failed to submit {op}{}: {source}", at(chunk)))]
    Submission { op: OpKind, chunk: Option<usize>, source: tandem_device::Error },

    /// The accelerator reported an operation as failed after running it.
    #[snafu(display("{op}{} completed with error: {reason}", at(chunk)))]
    CompletedWithError { op: OpKind, chunk: Option<usize>, reason: String },

    #[snafu(display("{op}{} did not signal within {waited_ms}ms", at(chunk)))]
    WaitTimeout { op: OpKind, chunk: Option<usize>, waited_ms: u64 },

    /// Slot lookup for a role the pool was not built with.
    #[snafu(display("no {role:?} slot {index} in pool"))]
    MissingSlot { role: Role, index: usize },

    #[snafu(display("invalid pipeline configuration: {reason}"))]
    InvalidConfig { reason: String },

    #[snafu(display("invalid problem: {reason}"))]
    InvalidProblem { reason: String },

    /// Device error outside of a specific submission (allocation, views).
    #[snafu(display("device error: {source}"))]
    Device { source: tandem_device::Error },
}
