use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Invalid buffer view parameters.
    #[snafu(display("invalid view: offset {offset} + len {len} exceeds buffer len {buffer_len}"))]
    InvalidView { offset: usize, len: usize, buffer_len: usize },

    /// Device memory limit would be exceeded by an allocation.
    #[snafu(display("out of device memory on {device}: requested {requested} bytes, {available} available"))]
    OutOfDeviceMemory { device: String, requested: usize, available: usize },

    /// Kernel image does not provide the requested entry point.
    #[snafu(display("kernel '{name}' not found in image '{image}'"))]
    KernelNotFound { name: String, image: String },

    #[snafu(display("invalid arguments for kernel '{kernel}': {reason}"))]
    InvalidKernelArgs { kernel: String, reason: String },

    /// Problem size exceeds the kernel's internal buffers.
    #[snafu(display("size {size} is bigger than internal buffer size, please use a size smaller than {max}"))]
    SizeAboveMaximum { size: usize, max: usize },

    /// Failed to read a kernel image from disk.
    #[snafu(display("failed to read kernel image {}: {source}", path.display()))]
    ImageIo { path: PathBuf, source: std::io::Error },

    /// Failed to decode a kernel image manifest.
    #[snafu(display("failed to parse kernel image {}: {source}", path.display()))]
    ImageParse { path: PathBuf, source: serde_json::Error },

    #[snafu(display("invalid kernel image '{image}': {reason}"))]
    InvalidImage { image: String, reason: String },

    /// Every candidate device refused the kernel image.
    #[snafu(display("failed to program any of {attempted} device(s) found"))]
    NoUsableDevice { attempted: usize },

    /// The queue no longer accepts commands.
    #[snafu(display("command queue '{queue}' is closed"))]
    QueueClosed { queue: String },

    /// A command ran and reported an error.
    #[snafu(display("{kind} #{id} failed: {reason}"))]
    CommandFailed { kind: String, id: u64, reason: String },

    /// A command's wait-list contained a failed event.
    #[snafu(display("dependency #{dependency} failed: {reason}"))]
    DependencyFailed { dependency: u64, reason: String },

    #[snafu(display("timed out after {waited_ms}ms waiting for {kind} #{id}"))]
    WaitTimeout { kind: String, id: u64, waited_ms: u64 },

    /// Worker pool backing a queue could not be started.
    #[snafu(display("failed to start worker pool: {source}"))]
    WorkerPool { source: rayon::ThreadPoolBuildError },

    #[snafu(display("runtime error: {message}"))]
    Runtime { message: String },
}
