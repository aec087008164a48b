//! Core types for the SnailVM runtime.
//!
//! This crate provides the foundational types shared by every other
//! component: the wire-level type tags of heap values and the error
//! taxonomy of the virtual machine.
//!
//! # Overview
//!
//! - [`TypeTag`] - Closed set of value types with their bytecode encoding
//! - [`VmError`] - Errors raised by the loader and the interpreter
//! - [`VmResult`] - Result alias used across the VM
//!
//! # Examples
//!
//! ```
//! use core_types::{TypeTag, VmError};
//!
//! let tag = TypeTag::from_byte(0x01).unwrap();
//! assert_eq!(tag, TypeTag::I32);
//!
//! // Arithmetic dispatches on the wider of the two operand tags.
//! assert_eq!(TypeTag::I32.max(TypeTag::Usize), TypeTag::Usize);
//!
//! let err = VmError::invalid("unknown opcode");
//! assert!(matches!(err, VmError::InvalidBytecode(_)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod type_tag;

pub use error::{VmError, VmResult};
pub use type_tag::TypeTag;
