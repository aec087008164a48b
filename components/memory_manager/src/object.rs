//! Heap object representation.
//!
//! Every value the VM manipulates is an [`Object`] owned by the heap.
//! Scalar and string objects carry raw payload bytes; arrays carry link
//! slots referencing other objects.

use core_types::TypeTag;

use crate::heap::Handle;

/// A null-or-object slot participating in the link-count protocol.
///
/// Assignment must go through [`Heap::assign_link`](crate::Heap::assign_link)
/// (or [`Heap::assign_slot`](crate::Heap::assign_slot) for array elements)
/// so the previous target is released and the new target retained.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Link {
    target: Option<Handle>,
}

impl Link {
    /// A link referencing nothing.
    pub fn null() -> Self {
        Link { target: None }
    }

    /// The referenced object, if any.
    pub fn target(&self) -> Option<Handle> {
        self.target
    }

    /// True when the link references nothing.
    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    pub(crate) fn set(&mut self, target: Option<Handle>) {
        self.target = target;
    }
}

/// Payload of a heap object.
#[derive(Debug, PartialEq, Eq)]
pub enum ObjectData {
    /// Raw bytes: little-endian integers for I32/USIZE, UTF-8 for STRING,
    /// empty for VOID.
    Bytes(Vec<u8>),
    /// Link slots of an ARRAY, one per element, initially null.
    Slots(Vec<Link>),
}

/// A typed heap value with an embedded link count.
///
/// The link count equals the number of live references to the object:
/// operand-stack entries, link slots (locals, globals, array elements),
/// and the constant pool's own reference. Objects whose count is zero are
/// reclaimed by the heap under allocation pressure.
#[derive(Debug)]
pub struct Object {
    /// Value type of this object.
    pub tag: TypeTag,
    /// Payload bytes or array slots.
    pub data: ObjectData,
    /// Number of live references to this object.
    pub link_count: usize,
}

impl Object {
    /// Create an object holding raw payload bytes.
    pub fn bytes(tag: TypeTag, bytes: Vec<u8>) -> Self {
        Object {
            tag,
            data: ObjectData::Bytes(bytes),
            link_count: 0,
        }
    }

    /// Create an ARRAY object with `len` null slots.
    pub fn array(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, Link::null);
        Object {
            tag: TypeTag::Array,
            data: ObjectData::Slots(slots),
            link_count: 0,
        }
    }

    /// Meaningful payload length: byte count for scalar and string
    /// objects, element count for arrays.
    pub fn data_size(&self) -> usize {
        match &self.data {
            ObjectData::Bytes(b) => b.len(),
            ObjectData::Slots(s) => s.len(),
        }
    }

    /// Payload bytes of a non-array object.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.data {
            ObjectData::Bytes(b) => Some(b),
            ObjectData::Slots(_) => None,
        }
    }

    /// Array slots of an ARRAY object.
    pub fn slots(&self) -> Option<&[Link]> {
        match &self.data {
            ObjectData::Bytes(_) => None,
            ObjectData::Slots(s) => Some(s),
        }
    }

    /// Read the first four payload bytes as a little-endian signed integer.
    pub fn as_i32(&self) -> Option<i32> {
        let bytes = self.payload()?;
        Some(i32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
    }

    /// Read the first four payload bytes as a little-endian unsigned
    /// integer.
    pub fn as_u32(&self) -> Option<u32> {
        let bytes = self.payload()?;
        Some(u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
    }

    /// Boolean coercion.
    ///
    /// Arrays are true iff they have at least one element; every other
    /// object is true iff any payload byte is non-zero.
    pub fn is_truthy(&self) -> bool {
        match &self.data {
            ObjectData::Bytes(b) => b.iter().any(|&byte| byte != 0),
            ObjectData::Slots(s) => !s.is_empty(),
        }
    }

    /// Equality: same tag and byte-exact payload (slot-exact for arrays).
    pub fn value_eq(&self, other: &Object) -> bool {
        self.tag == other.tag && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_object(value: i32) -> Object {
        Object::bytes(TypeTag::I32, value.to_le_bytes().to_vec())
    }

    #[test]
    fn test_payload_round_trip() {
        let obj = int_object(-105_676);
        assert_eq!(obj.as_i32(), Some(-105_676));
        assert_eq!(obj.data_size(), 4);
    }

    #[test]
    fn test_unsigned_read() {
        let obj = Object::bytes(TypeTag::Usize, 3_000_000_000u32.to_le_bytes().to_vec());
        assert_eq!(obj.as_u32(), Some(3_000_000_000));
    }

    #[test]
    fn test_truthiness_of_integers() {
        assert!(int_object(1).is_truthy());
        assert!(int_object(-1).is_truthy());
        assert!(!int_object(0).is_truthy());
    }

    #[test]
    fn test_truthiness_of_strings() {
        let empty = Object::bytes(TypeTag::String, Vec::new());
        let zeroes = Object::bytes(TypeTag::String, vec![0, 0]);
        let text = Object::bytes(TypeTag::String, b"hi".to_vec());
        assert!(!empty.is_truthy());
        assert!(!zeroes.is_truthy());
        assert!(text.is_truthy());
    }

    #[test]
    fn test_truthiness_of_arrays() {
        assert!(!Object::array(0).is_truthy());
        assert!(Object::array(3).is_truthy());
    }

    #[test]
    fn test_value_eq_requires_tag_and_payload() {
        let a = int_object(7);
        let b = int_object(7);
        let c = int_object(8);
        let d = Object::bytes(TypeTag::Usize, 7u32.to_le_bytes().to_vec());
        assert!(a.value_eq(&b));
        assert!(!a.value_eq(&c));
        assert!(!a.value_eq(&d));
    }

    #[test]
    fn test_array_slots_start_null() {
        let arr = Object::array(4);
        let slots = arr.slots().unwrap();
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(Link::is_null));
    }
}
