//! Runtime orchestration.
//!
//! The Runtime wires the components together for one program run: open
//! the file, load the program sections, execute the entry block.

use std::path::Path;

use bytecode_system::BinaryReader;
use interpreter::Vm;
use memory_manager::Heap;

use crate::error::{CliError, CliResult};

/// Coordinates loading and executing a bytecode file.
pub struct Runtime {
    debug: bool,
    jit_threshold: u64,
}

impl Runtime {
    /// Create a runtime with the default compilation threshold.
    pub fn new() -> Self {
        Runtime {
            debug: false,
            jit_threshold: interpreter::DEFAULT_JIT_THRESHOLD,
        }
    }

    /// Enable per-instruction trace output.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the call-count threshold for compilation.
    pub fn with_jit_threshold(mut self, threshold: u64) -> Self {
        self.jit_threshold = threshold;
        self
    }

    /// Load and run a bytecode file to completion.
    ///
    /// HALT surfaces as `CliError::VmError(VmError::Halt)`; the caller
    /// decides the exit status.
    pub fn execute_file(&self, path: &Path) -> CliResult<()> {
        let mut reader = BinaryReader::open(path)
            .map_err(|_| CliError::FileNotFound(path.display().to_string()))?;
        let mut heap = Heap::new();
        let program = bytecode_system::load(&mut reader, &mut heap)?;

        let mut vm = Vm::new(reader, program, heap)
            .with_debug(self.debug)
            .with_jit_threshold(self.jit_threshold);
        vm.run()?;
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
