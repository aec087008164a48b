//! Call frames.
//!
//! A frame is per-call scratch: `arg_count + local_count` link slots.
//! CALL does not copy arguments into the frame; callers leave arguments on
//! the shared operand stack and callees store them with STORE_LOCAL.

use core_types::{VmError, VmResult};
use memory_manager::{Handle, Heap, Link};

/// Link slots for one function invocation (or the top-level entry block).
#[derive(Debug, Default)]
pub struct Frame {
    slots: Vec<Link>,
}

impl Frame {
    /// Create a frame with `size` null slots.
    pub fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, Link::null);
        Frame { slots }
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// The target of a slot, bounds-checked.
    pub fn get(&self, index: usize) -> VmResult<Option<Handle>> {
        self.slots
            .get(index)
            .map(Link::target)
            .ok_or_else(|| VmError::invalid(format!("local index {index} out of bounds")))
    }

    /// Mutable access to a slot's link, bounds-checked.
    pub fn link_mut(&mut self, index: usize) -> VmResult<&mut Link> {
        self.slots
            .get_mut(index)
            .ok_or_else(|| VmError::invalid(format!("local index {index} out of bounds")))
    }

    /// Release every held reference; must run on all exit paths of the
    /// call the frame belongs to.
    pub fn release(mut self, heap: &mut Heap) {
        for link in &mut self.slots {
            heap.clear_link(link);
        }
    }
}
