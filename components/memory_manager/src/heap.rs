//! Heap allocation and reclamation.
//!
//! The [`Heap`] owns every [`Object`] for the object's entire lifetime.
//! References handed out are index-based [`Handle`]s; the operand stack and
//! every [`Link`] hold non-owning handles whose liveness is guaranteed by
//! the link-count protocol.
//!
//! Reclamation is not a tracing collector: it runs only when an allocation
//! would otherwise grow the object table, and it frees exactly the objects
//! whose link count is zero at that moment. Each unlinked object is
//! reclaimed once, so the amortized cost per allocation is constant.
//! Reference cycles are never reclaimed.

use core_types::{TypeTag, VmError, VmResult};

use crate::object::{Link, Object, ObjectData};

/// Non-owning reference to a heap object.
///
/// Handles stay valid as long as the referenced object is kept alive by a
/// positive link count (or by the constant pool's own reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator owning every heap object.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Option<Object>>,
    free: Vec<u32>,
    reclaim_runs: u64,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            reclaim_runs: 0,
        }
    }

    /// Allocate an object holding raw payload bytes.
    pub fn create_bytes(&mut self, tag: TypeTag, bytes: Vec<u8>) -> Handle {
        self.insert(Object::bytes(tag, bytes))
    }

    /// Allocate an ARRAY object with `len` null slots.
    pub fn create_array(&mut self, len: usize) -> Handle {
        self.insert(Object::array(len))
    }

    /// Number of live objects currently owned.
    pub fn size(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// How many times reclamation has run.
    pub fn reclaim_runs(&self) -> u64 {
        self.reclaim_runs
    }

    /// The object behind a handle, if it is still alive.
    pub fn get(&self, handle: Handle) -> Option<&Object> {
        self.slots.get(handle.index())?.as_ref()
    }

    /// Mutable access to the object behind a handle.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    /// Iterate over every live object with its handle.
    pub fn live(&self) -> impl Iterator<Item = (Handle, &Object)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|obj| (Handle(i as u32), obj)))
    }

    /// Increment the link count of the referenced object.
    pub fn retain(&mut self, handle: Handle) {
        if let Some(obj) = self.get_mut(handle) {
            obj.link_count += 1;
        }
    }

    /// Decrement the link count of the referenced object.
    ///
    /// The object is not freed here; it becomes a candidate for the next
    /// pressure-triggered reclaim.
    pub fn release(&mut self, handle: Handle) {
        if let Some(obj) = self.get_mut(handle) {
            obj.link_count = obj.link_count.saturating_sub(1);
        }
    }

    /// Assign a target to a link, running the link-count protocol:
    /// the previous target (if any) is released, the new one retained.
    pub fn assign_link(&mut self, link: &mut Link, value: Handle) {
        if let Some(old) = link.target() {
            self.release(old);
        }
        link.set(Some(value));
        self.retain(value);
    }

    /// Release a link's target and null the link.
    ///
    /// Used when a frame or global set goes out of scope.
    pub fn clear_link(&mut self, link: &mut Link) {
        if let Some(old) = link.target() {
            self.release(old);
        }
        link.set(None);
    }

    /// The target of an array element slot.
    pub fn slot(&self, array: Handle, index: usize) -> VmResult<Option<Handle>> {
        let obj = self
            .get(array)
            .ok_or_else(|| VmError::invalid("dangling array reference"))?;
        let slots = obj
            .slots()
            .ok_or_else(|| VmError::invalid("array operation on non-array object"))?;
        let link = slots
            .get(index)
            .ok_or_else(|| VmError::invalid(format!("array index {index} out of bounds")))?;
        Ok(link.target())
    }

    /// Store a value into an array element slot via the link protocol.
    pub fn assign_slot(&mut self, array: Handle, index: usize, value: Handle) -> VmResult<()> {
        let old = {
            let obj = self
                .get_mut(array)
                .ok_or_else(|| VmError::invalid("dangling array reference"))?;
            let slots = match &mut obj.data {
                ObjectData::Slots(slots) => slots,
                ObjectData::Bytes(_) => {
                    return Err(VmError::invalid("array operation on non-array object"))
                }
            };
            let link = slots
                .get_mut(index)
                .ok_or_else(|| VmError::invalid(format!("array index {index} out of bounds")))?;
            let old = link.target();
            link.set(Some(value));
            old
        };
        if let Some(old) = old {
            self.release(old);
        }
        self.retain(value);
        Ok(())
    }

    fn insert(&mut self, obj: Object) -> Handle {
        if self.free.is_empty() && self.slots.len() == self.slots.capacity() {
            self.reclaim();
        }
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(obj);
                Handle(index)
            }
            None => {
                self.slots.push(Some(obj));
                Handle((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Walk the owned set and free every object whose link count is zero.
    fn reclaim(&mut self) {
        self.reclaim_runs += 1;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unlinked = matches!(slot, Some(obj) if obj.link_count == 0);
            if unlinked {
                *slot = None;
                self.free.push(index as u32);
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
