//! Baseline compiler.
//!
//! Decodes a function body in a single pass over its bytes, then resolves
//! every jump delta to the index of the instruction it lands on. A jump
//! may target the end of the block (falling off the end returns, like the
//! interpreter's loop condition). Targets outside the block or inside an
//! instruction's operand bytes are rejected at compile time.

use std::collections::HashMap;
use std::io::{Read, Seek};

use bytecode_system::{BinaryReader, Opcode};
use core_types::{VmError, VmResult};

use crate::ir::{CompiledFunction, CompiledOp};

/// Statistics for baseline compilation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStats {
    /// Number of function bodies compiled.
    pub functions_compiled: u64,
    /// Total decoded instructions across all compiles.
    pub total_ops: u64,
}

/// Baseline compiler turning bytecode bodies into [`CompiledFunction`]s.
#[derive(Debug, Default)]
pub struct BaselineJit {
    stats: BaselineStats,
}

impl BaselineJit {
    /// Create a new baseline compiler.
    pub fn new() -> Self {
        BaselineJit {
            stats: BaselineStats::default(),
        }
    }

    /// Compile `length` bytes of instructions starting at the reader's
    /// current offset.
    ///
    /// Consumes the body bytes from the cursor, like interpretation would.
    pub fn compile<R: Read + Seek>(
        &mut self,
        reader: &mut BinaryReader<R>,
        length: u32,
    ) -> VmResult<CompiledFunction> {
        let start = reader.get_offset();
        let end = start + length as u64;

        let mut ops = Vec::new();
        let mut index_at_offset = HashMap::new();
        // Jumps recorded as (op index, absolute target offset), resolved
        // once every instruction boundary is known.
        let mut pending_jumps = Vec::new();

        while reader.get_offset() < end {
            index_at_offset.insert(reader.get_offset(), ops.len());
            let byte = reader.read_byte()?;
            let opcode = Opcode::from_byte(byte)
                .ok_or_else(|| VmError::invalid(format!("Unknown opcode 0x{byte:02X}")))?;
            let op = match opcode {
                Opcode::PushConst => CompiledOp::PushConst(reader.read_u16()?),
                Opcode::PushLocal => CompiledOp::PushLocal(reader.read_u16()?),
                Opcode::PushGlobal => CompiledOp::PushGlobal(reader.read_u16()?),
                Opcode::StoreLocal => CompiledOp::StoreLocal(reader.read_u16()?),
                Opcode::StoreGlobal => CompiledOp::StoreGlobal(reader.read_u16()?),
                Opcode::Pop => CompiledOp::Pop,
                Opcode::Dup => CompiledOp::Dup,
                Opcode::Add => CompiledOp::Add,
                Opcode::Sub => CompiledOp::Sub,
                Opcode::Mul => CompiledOp::Mul,
                Opcode::Div => CompiledOp::Div,
                Opcode::Mod => CompiledOp::Mod,
                Opcode::Eq => CompiledOp::Eq,
                Opcode::Neq => CompiledOp::Neq,
                Opcode::Lt => CompiledOp::Lt,
                Opcode::Le => CompiledOp::Le,
                Opcode::Gt => CompiledOp::Gt,
                Opcode::Gte => CompiledOp::Gte,
                Opcode::And => CompiledOp::And,
                Opcode::Or => CompiledOp::Or,
                Opcode::Not => CompiledOp::Not,
                Opcode::Jmp | Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
                    let delta = reader.read_i16()?;
                    let target = reader.get_offset() as i64 + delta as i64;
                    pending_jumps.push((ops.len(), opcode, target));
                    // Placeholder index, patched below.
                    match opcode {
                        Opcode::Jmp => CompiledOp::Jmp(0),
                        Opcode::JmpIfFalse => CompiledOp::JmpIfFalse(0),
                        _ => CompiledOp::JmpIfTrue(0),
                    }
                }
                Opcode::Call => CompiledOp::Call(reader.read_u16()?),
                Opcode::Ret => CompiledOp::Ret,
                Opcode::Halt => CompiledOp::Halt,
                Opcode::NewArray => {
                    let element_count = reader.read_u32()?;
                    let _element_type = reader.read_byte()?;
                    CompiledOp::NewArray(element_count)
                }
                Opcode::GetArray => CompiledOp::GetArray,
                Opcode::SetArray => CompiledOp::SetArray,
                Opcode::InitArray => CompiledOp::InitArray(reader.read_u16()?),
                Opcode::IntrinsicCall => CompiledOp::IntrinsicCall(reader.read_u16()?),
            };
            ops.push(op);
        }

        if reader.get_offset() != end {
            return Err(VmError::invalid(
                "instruction block overruns its declared length",
            ));
        }

        index_at_offset.insert(end, ops.len());
        for (op_index, opcode, target) in pending_jumps {
            let target_index = u64::try_from(target)
                .ok()
                .filter(|t| (start..=end).contains(t))
                .and_then(|t| index_at_offset.get(&t).copied())
                .ok_or_else(|| {
                    VmError::invalid(format!(
                        "{} target does not land on an instruction boundary",
                        opcode.mnemonic()
                    ))
                })?;
            ops[op_index] = match opcode {
                Opcode::Jmp => CompiledOp::Jmp(target_index),
                Opcode::JmpIfFalse => CompiledOp::JmpIfFalse(target_index),
                _ => CompiledOp::JmpIfTrue(target_index),
            };
        }

        self.stats.functions_compiled += 1;
        self.stats.total_ops += ops.len() as u64;
        Ok(CompiledFunction::new(ops))
    }

    /// Compilation statistics.
    pub fn stats(&self) -> &BaselineStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_system::Block;
    use core_types::TypeTag;
    use std::io::Cursor;

    fn compile_block(block: Block) -> VmResult<CompiledFunction> {
        let bytes = block.into_bytes();
        let length = bytes.len() as u32;
        let mut reader = BinaryReader::new(Cursor::new(bytes));
        BaselineJit::new().compile(&mut reader, length)
    }

    #[test]
    fn test_decode_straight_line_body() {
        let compiled = compile_block(
            Block::new()
                .with_index(Opcode::PushConst, 0)
                .with_index(Opcode::PushConst, 1)
                .op(Opcode::Add)
                .op(Opcode::Ret),
        )
        .unwrap();
        assert_eq!(
            compiled.ops(),
            &[
                CompiledOp::PushConst(0),
                CompiledOp::PushConst(1),
                CompiledOp::Add,
                CompiledOp::Ret,
            ]
        );
    }

    #[test]
    fn test_forward_jump_resolves_to_instruction_index() {
        // JMP over the POP, landing on RET.
        let compiled = compile_block(
            Block::new()
                .jump(Opcode::Jmp, 1)
                .op(Opcode::Pop)
                .op(Opcode::Ret),
        )
        .unwrap();
        assert_eq!(compiled.ops()[0], CompiledOp::Jmp(2));
    }

    #[test]
    fn test_backward_jump_forms_a_loop() {
        // offsets: 0 DUP, 1 JMP_IF_TRUE (-4 lands back on DUP)
        let compiled = compile_block(
            Block::new().op(Opcode::Dup).jump(Opcode::JmpIfTrue, -4),
        )
        .unwrap();
        assert_eq!(compiled.ops()[1], CompiledOp::JmpIfTrue(0));
    }

    #[test]
    fn test_jump_to_block_end_is_allowed() {
        let compiled = compile_block(Block::new().jump(Opcode::Jmp, 1).op(Opcode::Pop)).unwrap();
        assert_eq!(compiled.ops()[0], CompiledOp::Jmp(2));
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn test_jump_into_operand_bytes_rejected() {
        // Delta -1 lands inside the JMP's own operand field.
        let err = compile_block(Block::new().op(Opcode::Pop).jump(Opcode::Jmp, -1)).unwrap_err();
        assert!(matches!(err, VmError::InvalidBytecode(_)));
    }

    #[test]
    fn test_jump_outside_block_rejected() {
        let err = compile_block(Block::new().jump(Opcode::Jmp, 100)).unwrap_err();
        assert!(matches!(err, VmError::InvalidBytecode(_)));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut reader = BinaryReader::new(Cursor::new(vec![0xEEu8]));
        let err = BaselineJit::new().compile(&mut reader, 1).unwrap_err();
        assert!(matches!(err, VmError::InvalidBytecode(_)));
    }

    #[test]
    fn test_operand_overrunning_block_length_rejected() {
        // PUSH_CONST needs two operand bytes, but the block claims to end
        // after the opcode byte; the operand bytes exist in the stream.
        let bytes = Block::new().with_index(Opcode::PushConst, 7).into_bytes();
        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = BaselineJit::new().compile(&mut reader, 1).unwrap_err();
        assert!(matches!(err, VmError::InvalidBytecode(_)));
    }

    #[test]
    fn test_truncated_body_is_eof() {
        let mut reader = BinaryReader::new(Cursor::new(vec![Opcode::PushConst.as_byte()]));
        let err = BaselineJit::new().compile(&mut reader, 3).unwrap_err();
        assert!(matches!(err, VmError::UnexpectedEof));
    }

    #[test]
    fn test_new_array_keeps_element_count() {
        let compiled =
            compile_block(Block::new().new_array(5, TypeTag::I32).op(Opcode::Ret)).unwrap();
        assert_eq!(compiled.ops()[0], CompiledOp::NewArray(5));
    }

    #[test]
    fn test_stats_accumulate() {
        let bytes = Block::new().op(Opcode::Ret).into_bytes();
        let mut jit = BaselineJit::new();
        for _ in 0..3 {
            let mut reader = BinaryReader::new(Cursor::new(bytes.clone()));
            jit.compile(&mut reader, bytes.len() as u32).unwrap();
        }
        assert_eq!(jit.stats().functions_compiled, 3);
        assert_eq!(jit.stats().total_ops, 3);
    }
}
