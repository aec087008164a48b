//! Binary program image builder.
//!
//! Assembles a complete, bit-exact bytecode image: header, constant pool,
//! globals, function table, intrinsic table, and the trailing entry block.
//! All multi-byte fields are emitted big-endian, matching what the loader
//! expects. Test fixtures across the workspace are built with this.

use core_types::TypeTag;

use crate::opcode::Opcode;
use crate::program::MAGIC;

/// Builder for a complete bytecode image.
pub struct ProgramBuilder {
    version: u16,
    main_function_index: u16,
    constants: Vec<Vec<u8>>,
    globals: Vec<Vec<u8>>,
    functions: Vec<Vec<u8>>,
    intrinsics: Vec<Vec<u8>>,
    entry: Vec<u8>,
}

impl ProgramBuilder {
    /// Start an image with version 1 and main function index 0.
    pub fn new() -> Self {
        ProgramBuilder {
            version: 1,
            main_function_index: 0,
            constants: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            intrinsics: Vec::new(),
            entry: Vec::new(),
        }
    }

    /// Override the main function index in the header.
    pub fn main_function(mut self, index: u16) -> Self {
        self.main_function_index = index;
        self
    }

    /// Add an I32 constant-pool entry.
    pub fn const_i32(mut self, value: i32) -> Self {
        let mut entry = vec![TypeTag::I32.as_byte()];
        entry.extend_from_slice(&(value as u32).to_be_bytes());
        self.constants.push(entry);
        self
    }

    /// Add a USIZE constant-pool entry.
    pub fn const_usize(mut self, value: u32) -> Self {
        let mut entry = vec![TypeTag::Usize.as_byte()];
        entry.extend_from_slice(&value.to_be_bytes());
        self.constants.push(entry);
        self
    }

    /// Add a STRING constant-pool entry.
    pub fn const_string(mut self, value: &str) -> Self {
        let mut entry = vec![TypeTag::String.as_byte()];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        self.constants.push(entry);
        self
    }

    /// Add raw bytes as a constant-pool entry (for malformed-input tests).
    pub fn raw_constant(mut self, bytes: Vec<u8>) -> Self {
        self.constants.push(bytes);
        self
    }

    /// Declare a scalar global of the given type.
    pub fn global(mut self, name: &str, tag: TypeTag) -> Self {
        let mut entry = vec![name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry.push(tag.as_byte());
        self.globals.push(entry);
        self
    }

    /// Declare an I32 global.
    pub fn global_i32(self, name: &str) -> Self {
        self.global(name, TypeTag::I32)
    }

    /// Declare an array global with an element count and element type.
    pub fn global_array(mut self, name: &str, element_count: u32, element_type: TypeTag) -> Self {
        let mut entry = vec![name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry.push(TypeTag::Array.as_byte());
        entry.extend_from_slice(&element_count.to_be_bytes());
        entry.push(element_type.as_byte());
        self.globals.push(entry);
        self
    }

    /// Add a function with its instruction body.
    pub fn function(
        mut self,
        name: &str,
        arg_count: u8,
        return_type: TypeTag,
        local_count: u16,
        body: Vec<u8>,
    ) -> Self {
        let mut entry = vec![name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry.push(arg_count);
        entry.push(return_type.as_byte());
        entry.extend_from_slice(&local_count.to_be_bytes());
        entry.extend_from_slice(&(body.len() as u32).to_be_bytes());
        entry.extend_from_slice(&body);
        self.functions.push(entry);
        self
    }

    /// Add an intrinsic declaration.
    pub fn intrinsic(mut self, name: &str, arg_count: u8, return_type: TypeTag) -> Self {
        let mut entry = vec![name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry.push(arg_count);
        entry.push(return_type.as_byte());
        self.intrinsics.push(entry);
        self
    }

    /// Set the top-level entry block.
    pub fn entry(mut self, block: Vec<u8>) -> Self {
        self.entry = block;
        self
    }

    /// Emit the complete binary image.
    pub fn build(self) -> Vec<u8> {
        let mut image = Vec::new();
        image.extend_from_slice(&MAGIC.to_be_bytes());
        image.extend_from_slice(&self.version.to_be_bytes());
        image.extend_from_slice(&self.main_function_index.to_be_bytes());

        for section in [self.constants, self.globals, self.functions, self.intrinsics] {
            image.extend_from_slice(&(section.len() as u16).to_be_bytes());
            for entry in section {
                image.extend_from_slice(&entry);
            }
        }

        image.extend_from_slice(&(self.entry.len() as u32).to_be_bytes());
        image.extend_from_slice(&self.entry);
        image
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a single instruction block (a function body or the entry
/// block), with operand encoding handled per opcode family.
pub struct Block {
    bytes: Vec<u8>,
}

impl Block {
    /// Start an empty block.
    pub fn new() -> Self {
        Block { bytes: Vec::new() }
    }

    /// Emit an operand-less instruction.
    pub fn op(mut self, opcode: Opcode) -> Self {
        self.bytes.push(opcode.as_byte());
        self
    }

    /// Emit an instruction with a u16 index operand
    /// (PUSH/STORE/CALL/INIT_ARRAY/INTRINSIC_CALL).
    pub fn with_index(mut self, opcode: Opcode, index: u16) -> Self {
        self.bytes.push(opcode.as_byte());
        self.bytes.extend_from_slice(&index.to_be_bytes());
        self
    }

    /// Emit a jump with a signed byte delta measured from the end of the
    /// delta field.
    pub fn jump(mut self, opcode: Opcode, delta: i16) -> Self {
        self.bytes.push(opcode.as_byte());
        self.bytes.extend_from_slice(&delta.to_be_bytes());
        self
    }

    /// Emit NEW_ARRAY with its element count and element type.
    pub fn new_array(mut self, element_count: u32, element_type: TypeTag) -> Self {
        self.bytes.push(Opcode::NewArray.as_byte());
        self.bytes.extend_from_slice(&element_count.to_be_bytes());
        self.bytes.push(element_type.as_byte());
        self
    }

    /// Current byte length of the block.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finish the block.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
