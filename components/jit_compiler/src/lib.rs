//! Baseline compilation tier for the SnailVM call hot path.
//!
//! Functions that cross the call-count threshold are compiled once into a
//! [`CompiledFunction`]: every instruction of the body decoded ahead of
//! time and every jump delta resolved to an instruction index. The
//! interpreter executes the compiled form without touching the bytecode
//! cursor, with semantics identical to direct interpretation.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{BinaryReader, Block, Opcode};
//! use jit_compiler::{BaselineJit, CompiledOp};
//! use std::io::Cursor;
//!
//! let body = Block::new()
//!     .with_index(Opcode::PushConst, 0)
//!     .op(Opcode::Ret)
//!     .into_bytes();
//! let length = body.len() as u32;
//!
//! let mut jit = BaselineJit::new();
//! let mut reader = BinaryReader::new(Cursor::new(body));
//! let compiled = jit.compile(&mut reader, length).unwrap();
//! assert_eq!(compiled.ops(), &[CompiledOp::PushConst(0), CompiledOp::Ret]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod baseline;
pub mod ir;

// Re-export main types at crate root
pub use baseline::{BaselineJit, BaselineStats};
pub use ir::{CompiledFunction, CompiledOp};
