use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tandem_device::{RowMultiply, SystolicMultiply};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, about = "Offload a large matrix multiply to the accelerator and compare it with the CPU")]
pub struct Cli {
    /// Kernel image to program the accelerator with
    pub image: PathBuf,

    /// Rows and columns of the square matrices
    #[arg(long, default_value_t = 256)]
    pub size: usize,

    /// Buffer slots per role (defaults to TANDEM_SLOTS or 2)
    #[arg(long)]
    pub slots: Option<usize>,

    /// Rows of A per chunk (defaults to TANDEM_ROWS_PER_CHUNK or 1)
    #[arg(long)]
    pub rows_per_chunk: Option<usize>,

    /// Seed for the random inputs
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Give up waiting on an operation after this many milliseconds
    #[arg(long)]
    pub wait_timeout_ms: Option<u64>,

    /// Log every completed accelerator operation
    #[arg(long)]
    pub trace_events: bool,

    /// Execution strategy
    #[arg(long, value_enum, default_value_t = Variant::Overlap)]
    pub variant: Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// Chunked pipeline overlapping transfers with compute
    Overlap,
    /// Whole matrices through the systolic kernel in one launch
    Systolic,
}

impl Variant {
    /// Kernel the accelerator must be programmed with.
    pub fn kernel(self) -> &'static str {
        match self {
            Self::Overlap => RowMultiply::NAME,
            Self::Systolic => SystolicMultiply::NAME,
        }
    }
}
