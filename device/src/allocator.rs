use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::buffer::Buffer;
use crate::error::{OutOfDeviceMemorySnafu, Result};

pub trait Allocator: Send + Sync + fmt::Debug {
    /// Allocate a zero-initialized buffer of `len` elements.
    fn alloc(&self, len: usize) -> Result<Buffer>;

    /// Bytes currently held by live buffers from this allocator.
    fn in_use(&self) -> usize {
        0
    }

    fn name(&self) -> &str;
}

/// Host allocator using system memory, without a limit.
#[derive(Debug, Clone, Default)]
pub struct HostAllocator;

impl Allocator for HostAllocator {
    fn alloc(&self, len: usize) -> Result<Buffer> {
        Ok(Buffer::zeroed(len))
    }

    fn name(&self) -> &str {
        "HOST"
    }
}

#[derive(Debug)]
struct MemoryPool {
    limit: usize,
    used: AtomicUsize,
}

/// Bytes reserved against a device memory limit, returned on drop.
#[derive(Debug)]
pub(crate) struct Reservation {
    pool: Arc<MemoryPool>,
    bytes: usize,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Allocator for accelerator global memory.
///
/// Buffers return their bytes to the pool when the last view is dropped.
#[derive(Debug, Clone)]
pub struct DeviceAllocator {
    device: String,
    pool: Arc<MemoryPool>,
}

impl DeviceAllocator {
    pub fn new(device: impl Into<String>, limit: usize) -> Self {
        Self { device: device.into(), pool: Arc::new(MemoryPool { limit, used: AtomicUsize::new(0) }) }
    }

    pub fn limit(&self) -> usize {
        self.pool.limit
    }
}

impl Allocator for DeviceAllocator {
    fn alloc(&self, len: usize) -> Result<Buffer> {
        let bytes = len * size_of::<i32>();
        let limit = self.pool.limit;

        let reserved = self
            .pool
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_add(bytes).filter(|&n| n <= limit));

        match reserved {
            Ok(_) => {
                let reservation = Reservation { pool: Arc::clone(&self.pool), bytes };
                Ok(Buffer::with_reservation(len, Some(reservation)))
            }
            Err(used) => OutOfDeviceMemorySnafu {
                device: self.device.clone(),
                requested: bytes,
                available: limit.saturating_sub(used),
            }
            .fail(),
        }
    }

    fn in_use(&self) -> usize {
        self.pool.used.load(Ordering::Acquire)
    }

    fn name(&self) -> &str {
        &self.device
    }
}
