//! Memory manager - heap object model and allocator.
//!
//! This component provides:
//! - Typed heap objects with an embedded link count
//! - Null-or-object link slots that run the link-count protocol on
//!   assignment
//! - An allocator that owns every heap object and reclaims unlinked ones
//!   when an allocation would otherwise grow the owned set
//!
//! Links never own their target; liveness is guaranteed purely by the link
//! count. Objects participating in a reference cycle are never reclaimed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod heap;
pub mod object;

pub use heap::{Handle, Heap};
pub use object::{Link, Object, ObjectData};
