use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use snafu::ensure;

use crate::allocator::Reservation;
use crate::error::{InvalidViewSnafu, Result, SizeMismatchSnafu};

pub type BufferId = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Shared storage referenced by every view of a buffer.
#[derive(Debug)]
struct BufferData {
    id: BufferId,
    storage: RwLock<Box<[i32]>>,
    /// Device memory accounting, released when the last view drops.
    _reservation: Option<Reservation>,
}

/// A buffer of `i32` elements, possibly a view into a larger allocation.
///
/// Host matrices and device-side slots share this type. Clones and views
/// refer to the same storage; access is guarded by a `parking_lot::RwLock`
/// so commands running on worker threads can touch it safely.
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Arc<BufferData>,
    /// Offset into the base allocation (in elements).
    offset: usize,
    /// Length of this view (in elements).
    len: usize,
}

impl Buffer {
    pub(crate) fn with_reservation(len: usize, reservation: Option<Reservation>) -> Self {
        Self::from_boxed(vec![0; len].into_boxed_slice(), reservation)
    }

    fn from_boxed(storage: Box<[i32]>, reservation: Option<Reservation>) -> Self {
        let len = storage.len();
        let data = BufferData {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            storage: RwLock::new(storage),
            _reservation: reservation,
        };
        Self { data: Arc::new(data), offset: 0, len }
    }

    /// Zero-initialized host buffer.
    pub fn zeroed(len: usize) -> Self {
        Self::with_reservation(len, None)
    }

    /// Host buffer taking ownership of `data`.
    pub fn from_vec(data: Vec<i32>) -> Self {
        Self::from_boxed(data.into_boxed_slice(), None)
    }

    /// Identifier of the underlying allocation, shared by all views.
    pub fn id(&self) -> BufferId {
        self.data.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Create a view of `len` elements starting at `offset` within this view.
    pub fn view(&self, offset: usize, len: usize) -> Result<Self> {
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            InvalidViewSnafu { offset, len, buffer_len: self.len }
        );
        Ok(Self { data: Arc::clone(&self.data), offset: self.offset + offset, len })
    }

    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Run `f` over the viewed elements under a read lock.
    pub fn read<R>(&self, f: impl FnOnce(&[i32]) -> R) -> R {
        let storage = self.data.storage.read();
        f(&storage[self.range()])
    }

    /// Run `f` over the viewed elements under a write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut [i32]) -> R) -> R {
        let mut storage = self.data.storage.write();
        let range = self.range();
        f(&mut storage[range])
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.read(|data| data.to_vec())
    }

    pub fn copy_from_slice(&self, src: &[i32]) -> Result<()> {
        ensure!(src.len() == self.len, SizeMismatchSnafu { expected: self.len, actual: src.len() });
        self.write(|dst| dst.copy_from_slice(src));
        Ok(())
    }

    pub fn copy_to_slice(&self, dst: &mut [i32]) -> Result<()> {
        ensure!(dst.len() == self.len, SizeMismatchSnafu { expected: self.len, actual: dst.len() });
        self.read(|src| dst.copy_from_slice(src));
        Ok(())
    }
}

/// A copy between two equally sized views.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub src: Buffer,
    pub dst: Buffer,
}

impl Transfer {
    pub fn new(src: Buffer, dst: Buffer) -> Result<Self> {
        ensure!(src.len() == dst.len(), SizeMismatchSnafu { expected: dst.len(), actual: src.len() });
        Ok(Self { src, dst })
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Perform the copy.
    ///
    /// The source is staged before the destination lock is taken; no two
    /// locks are ever held at once.
    pub fn execute(&self) -> Result<()> {
        let staged = self.src.to_vec();
        self.dst.copy_from_slice(&staged)
    }
}
