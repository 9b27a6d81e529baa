//! Simulated asynchronous accelerator.
//!
//! The device exposes the same surface a real accelerator runtime does:
//! buffers in global memory, compiled kernels loaded from an image, and an
//! out-of-order command queue whose commands signal [`Event`]s on completion.

pub mod allocator;
pub mod buffer;
pub mod error;
pub mod image;
pub mod inject;
pub mod kernel;
pub mod platform;
pub mod queue;
pub mod sync;

#[cfg(test)]
pub mod test;

pub use allocator::{Allocator, DeviceAllocator, HostAllocator};
pub use buffer::{Buffer, BufferId, Transfer};
pub use error::{Error, Result};
pub use image::{KernelImage, SIM_TARGET};
pub use inject::{Injection, InjectionHook};
pub use kernel::{Kernel, KernelArgs, RowMultiply, SystolicMultiply};
pub use platform::{DeviceSpec, ExecutionContext, Platform, Provisioner};
pub use queue::{CommandHook, CommandInfo, CommandQueue, OutOfOrderQueue};
pub use sync::{CommandKind, CommandStatus, Event, Profile};
