//! The virtual machine.
//!
//! [`Vm`] ties the bytecode cursor, the shared [`Environment`] and the
//! compiled-code table together. Construction wires the loaded program to
//! an output sink; [`Vm::run`] executes the top-level entry block to
//! completion.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::rc::Rc;

use bytecode_system::{BinaryReader, Program};
use core_types::VmResult;
use jit_compiler::{BaselineJit, CompiledFunction};
use memory_manager::Heap;

use crate::call_frame::Frame;
use crate::environment::Environment;
use crate::DEFAULT_JIT_THRESHOLD;

/// Execution engine for a loaded program.
///
/// The reader must be positioned at the first byte of the entry block,
/// which is where the loader leaves it.
pub struct Vm<R: Read + Seek> {
    pub(crate) reader: BinaryReader<R>,
    pub(crate) env: Environment,
    pub(crate) jit: BaselineJit,
    pub(crate) compiled: HashMap<usize, Rc<CompiledFunction>>,
    pub(crate) jit_threshold: u64,
    pub(crate) debug: bool,
    entry_length: u32,
    entry_frame_size: usize,
}

impl<R: Read + Seek> Vm<R> {
    /// Create a VM over a loaded program.
    ///
    /// `heap` must be the heap the loader allocated the program's
    /// constants on. Output goes to stdout unless overridden with
    /// [`Vm::with_output`].
    pub fn new(reader: BinaryReader<R>, program: Program, heap: Heap) -> Self {
        let entry_length = program.entry_length;
        let entry_frame_size = program.entry_frame_size();
        Vm {
            reader,
            env: Environment::new(program, heap, Box::new(std::io::stdout())),
            jit: BaselineJit::new(),
            compiled: HashMap::new(),
            jit_threshold: DEFAULT_JIT_THRESHOLD,
            debug: false,
            entry_length,
            entry_frame_size,
        }
    }

    /// Redirect intrinsic and trace output.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.env.output = output;
        self
    }

    /// Enable per-instruction trace output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the call-count threshold for compilation.
    ///
    /// `0` compiles every function on its first call; `u64::MAX` disables
    /// the compiled tier. Correctness does not depend on the value.
    pub fn with_jit_threshold(mut self, threshold: u64) -> Self {
        self.jit_threshold = threshold;
        self
    }

    /// Execute the top-level entry block to completion.
    pub fn run(&mut self) -> VmResult<()> {
        let mut frame = Frame::new(self.entry_frame_size);
        let result = self.run_block(self.entry_length, &mut frame);
        frame.release(&mut self.env.heap);
        result
    }

    /// The shared execution environment.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The current compilation threshold.
    pub fn jit_threshold(&self) -> u64 {
        self.jit_threshold
    }

    /// How many functions have been compiled so far.
    pub fn compiled_functions_count(&self) -> usize {
        self.compiled.len()
    }
}
