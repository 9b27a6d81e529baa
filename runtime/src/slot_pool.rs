//! Reusable transfer buffers.
//!
//! Each role owns `k` slots. Generation `g` always maps to slot `g mod k`,
//! so two generations closer than `k` never share a slot. The pool only
//! does bookkeeping; gating reuse on completion is the driver's job.

use std::collections::HashMap;

use snafu::{OptionExt, ResultExt};
use tandem_device::{Allocator, Buffer};
use tracing::trace;

use crate::error::{DeviceSnafu, MissingSlotSnafu, Result};
use crate::tracker::Handle;

/// Logical role of a slot buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    InputA,
    /// Only used when the second input varies per chunk.
    InputB,
    OutputC,
}

/// Reference to the slot a generation was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub role: Role,
    pub index: usize,
    pub generation: usize,
}

#[derive(Debug)]
struct Slot {
    buffer: Buffer,
    owner: Option<usize>,
    last_consumer: Option<Handle>,
}

#[derive(Debug)]
pub struct SlotPool {
    depth: usize,
    slots: HashMap<Role, Vec<Slot>>,
}

impl SlotPool {
    /// Allocate `depth` slots of `len` elements for every `(role, len)`.
    pub fn new(allocator: &dyn Allocator, depth: usize, roles: &[(Role, usize)]) -> Result<Self> {
        let depth = depth.max(1);
        let mut slots = HashMap::with_capacity(roles.len());
        for &(role, len) in roles {
            let buffers = (0..depth)
                .map(|_| -> Result<Slot> {
                    let buffer = allocator.alloc(len).context(DeviceSnafu)?;
                    Ok(Slot { buffer, owner: None, last_consumer: None })
                })
                .collect::<Result<Vec<_>>>()?;
            slots.insert(role, buffers);
        }
        Ok(Self { depth, slots })
    }

    /// Number of slots per role (k).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Assign `generation` to its slot for `role`.
    pub fn acquire(&mut self, role: Role, generation: usize) -> SlotRef {
        let depth = self.depth;
        let index = generation % depth;
        if let Some(slot) = self.slots.get_mut(&role).and_then(|slots| slots.get_mut(index)) {
            debug_assert!(
                slot.owner.is_none_or(|owner| generation == owner || generation >= owner + depth),
                "generation {generation} would share {role:?} slot {index} with live generation {:?}",
                slot.owner
            );
            slot.owner = Some(generation);
        }
        trace!(?role, index, generation, "acquired slot");
        SlotRef { role, index, generation }
    }

    fn slot(&self, slot: &SlotRef) -> Result<&Slot> {
        self.slots
            .get(&slot.role)
            .and_then(|slots| slots.get(slot.index))
            .context(MissingSlotSnafu { role: slot.role, index: slot.index })
    }

    /// Device buffer backing `slot`.
    pub fn buffer(&self, slot: &SlotRef) -> Result<&Buffer> {
        Ok(&self.slot(slot)?.buffer)
    }

    /// Generation currently owning the slot, if any.
    pub fn owner(&self, slot: &SlotRef) -> Option<usize> {
        self.slot(slot).ok().and_then(|slot| slot.owner)
    }

    /// Handle that must be signaled before the slot may be loaded again.
    pub fn last_consumer_handle(&self, slot: &SlotRef) -> Option<Handle> {
        self.slot(slot).ok().and_then(|slot| slot.last_consumer.clone())
    }

    /// Record the latest consumer of the slot's contents.
    pub fn record_consumer(&mut self, slot: &SlotRef, handle: Handle) {
        if let Some(entry) = self.slots.get_mut(&slot.role).and_then(|slots| slots.get_mut(slot.index)) {
            entry.last_consumer = Some(handle);
        }
    }
}
