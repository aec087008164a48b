//! Bytecode system for the SnailVM runtime.
//!
//! This crate provides everything between the raw bytecode file and the
//! interpreter:
//!
//! - [`BinaryReader`] - buffered, seekable, big-endian cursor over the input
//! - [`Opcode`] - the closed instruction set with its byte encoding
//! - [`load`] - section loader producing a [`Program`]
//! - [`ProgramBuilder`] - binary image writer used by tests and tooling
//!
//! All multi-byte integers in the file are big-endian; integer constants
//! are stored little-endian in memory for native access.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod builder;
pub mod loader;
pub mod opcode;
pub mod program;
pub mod reader;

// Re-export main types at crate root
pub use builder::{Block, ProgramBuilder};
pub use loader::load;
pub use opcode::Opcode;
pub use program::{Function, Header, Intrinsic, Program, MAGIC};
pub use reader::BinaryReader;
