//! Dispatch loops and the call hot path.
//!
//! Two executors share the environment's instruction helpers: the byte
//! loop reads opcodes and operands straight from the cursor, and the
//! compiled-form executor walks a function's decoded instruction list.
//! Both have identical observable behavior.

use std::io::{Read, Seek, Write};
use std::rc::Rc;

use bytecode_system::Opcode;
use core_types::{VmError, VmResult};
use jit_compiler::{CompiledFunction, CompiledOp};

use crate::call_frame::Frame;
use crate::vm::Vm;

const HALT_MESSAGE: &str = "HALT command found in bytecode!";

impl<R: Read + Seek> Vm<R> {
    /// Execute `length` bytes of instructions starting at the cursor.
    ///
    /// Returns when the cursor reaches the end of the block or a RET is
    /// executed; the remaining bytes of the block are then skipped by the
    /// caller's offset restore.
    pub(crate) fn run_block(&mut self, length: u32, frame: &mut Frame) -> VmResult<()> {
        let start = self.reader.get_offset();
        let end = start + length as u64;

        while self.reader.get_offset() < end {
            let byte = self.reader.read_byte()?;
            let opcode = Opcode::from_byte(byte)
                .ok_or_else(|| VmError::invalid(format!("Unknown opcode 0x{byte:02X}")))?;

            match opcode {
                Opcode::PushConst => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_push_const(index)?;
                }
                Opcode::PushLocal => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_push_local(frame, index)?;
                }
                Opcode::PushGlobal => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_push_global(index)?;
                }
                Opcode::StoreLocal => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_store_local(frame, index)?;
                }
                Opcode::StoreGlobal => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_store_global(index)?;
                }
                Opcode::Pop => {
                    self.trace_op(opcode, None)?;
                    self.env.exec_pop()?;
                }
                Opcode::Dup => {
                    self.trace_op(opcode, None)?;
                    self.env.exec_dup()?;
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    self.trace_op(opcode, None)?;
                    self.env.arithmetic(opcode)?;
                }

                Opcode::Eq
                | Opcode::Neq
                | Opcode::Lt
                | Opcode::Le
                | Opcode::Gt
                | Opcode::Gte => {
                    self.trace_op(opcode, None)?;
                    self.env.comparison(opcode)?;
                }
                Opcode::And | Opcode::Or => {
                    self.trace_op(opcode, None)?;
                    self.env.logical_binary(opcode)?;
                }
                Opcode::Not => {
                    self.trace_op(opcode, None)?;
                    self.env.logical_not()?;
                }

                Opcode::Jmp => {
                    let delta = self.reader.read_i16()?;
                    self.trace_op(opcode, Some(delta as i64))?;
                    self.jump(delta)?;
                }
                Opcode::JmpIfFalse => {
                    let delta = self.reader.read_i16()?;
                    self.trace_op(opcode, Some(delta as i64))?;
                    let condition = self.env.pop()?;
                    if !self.env.truthy(condition)? {
                        self.jump(delta)?;
                    }
                }
                Opcode::JmpIfTrue => {
                    let delta = self.reader.read_i16()?;
                    self.trace_op(opcode, Some(delta as i64))?;
                    let condition = self.env.pop()?;
                    if self.env.truthy(condition)? {
                        self.jump(delta)?;
                    }
                }
                Opcode::Call => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.call_function(index)?;
                }
                Opcode::Ret => {
                    self.trace_op(opcode, None)?;
                    self.trace_stack()?;
                    return Ok(());
                }
                Opcode::Halt => {
                    self.trace_op(opcode, None)?;
                    return Err(VmError::Halt(HALT_MESSAGE.to_string()));
                }

                Opcode::NewArray => {
                    let element_count = self.reader.read_u32()?;
                    let _element_type = self.reader.read_byte()?;
                    self.trace_op(opcode, Some(element_count as i64))?;
                    self.env.exec_new_array(element_count)?;
                }
                Opcode::GetArray => {
                    self.trace_op(opcode, None)?;
                    self.env.exec_get_array()?;
                }
                Opcode::SetArray => {
                    self.trace_op(opcode, None)?;
                    self.env.exec_set_array()?;
                }
                Opcode::InitArray => {
                    let count = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(count as i64))?;
                    self.env.exec_init_array(count)?;
                }

                Opcode::IntrinsicCall => {
                    let index = self.reader.read_u16()?;
                    self.trace_op(opcode, Some(index as i64))?;
                    self.env.exec_intrinsic(index)?;
                }
            }

            self.trace_stack()?;
        }

        Ok(())
    }

    /// Execute a compiled function body.
    ///
    /// Same observable contract as [`Vm::run_block`] over the original
    /// bytes; the cursor is only touched when calling back into an
    /// uncompiled function.
    pub(crate) fn run_compiled(
        &mut self,
        compiled: &Rc<CompiledFunction>,
        frame: &mut Frame,
    ) -> VmResult<()> {
        let ops = compiled.ops();
        let mut pc = 0;

        while pc < ops.len() {
            let op = ops[pc];
            self.trace_compiled_op(&op)?;
            pc += 1;

            match op {
                CompiledOp::PushConst(index) => self.env.exec_push_const(index)?,
                CompiledOp::PushLocal(index) => self.env.exec_push_local(frame, index)?,
                CompiledOp::PushGlobal(index) => self.env.exec_push_global(index)?,
                CompiledOp::StoreLocal(index) => self.env.exec_store_local(frame, index)?,
                CompiledOp::StoreGlobal(index) => self.env.exec_store_global(index)?,
                CompiledOp::Pop => self.env.exec_pop()?,
                CompiledOp::Dup => self.env.exec_dup()?,

                CompiledOp::Add => self.env.arithmetic(Opcode::Add)?,
                CompiledOp::Sub => self.env.arithmetic(Opcode::Sub)?,
                CompiledOp::Mul => self.env.arithmetic(Opcode::Mul)?,
                CompiledOp::Div => self.env.arithmetic(Opcode::Div)?,
                CompiledOp::Mod => self.env.arithmetic(Opcode::Mod)?,

                CompiledOp::Eq => self.env.comparison(Opcode::Eq)?,
                CompiledOp::Neq => self.env.comparison(Opcode::Neq)?,
                CompiledOp::Lt => self.env.comparison(Opcode::Lt)?,
                CompiledOp::Le => self.env.comparison(Opcode::Le)?,
                CompiledOp::Gt => self.env.comparison(Opcode::Gt)?,
                CompiledOp::Gte => self.env.comparison(Opcode::Gte)?,
                CompiledOp::And => self.env.logical_binary(Opcode::And)?,
                CompiledOp::Or => self.env.logical_binary(Opcode::Or)?,
                CompiledOp::Not => self.env.logical_not()?,

                CompiledOp::Jmp(target) => pc = target,
                CompiledOp::JmpIfFalse(target) => {
                    let condition = self.env.pop()?;
                    if !self.env.truthy(condition)? {
                        pc = target;
                    }
                }
                CompiledOp::JmpIfTrue(target) => {
                    let condition = self.env.pop()?;
                    if self.env.truthy(condition)? {
                        pc = target;
                    }
                }
                CompiledOp::Call(index) => self.call_function(index)?,
                CompiledOp::Ret => {
                    self.trace_stack()?;
                    return Ok(());
                }
                CompiledOp::Halt => return Err(VmError::Halt(HALT_MESSAGE.to_string())),

                CompiledOp::NewArray(element_count) => self.env.exec_new_array(element_count)?,
                CompiledOp::GetArray => self.env.exec_get_array()?,
                CompiledOp::SetArray => self.env.exec_set_array()?,
                CompiledOp::InitArray(count) => self.env.exec_init_array(count)?,
                CompiledOp::IntrinsicCall(index) => self.env.exec_intrinsic(index)?,
            }

            self.trace_stack()?;
        }

        Ok(())
    }

    /// The CALL hot path.
    ///
    /// Saves the caller's cursor, bumps the callee's call count, compiles
    /// the body once the count exceeds the threshold, then either runs the
    /// compiled form or seeks to the body and interprets it. The cursor is
    /// restored before returning to the caller.
    pub(crate) fn call_function(&mut self, index: u16) -> VmResult<()> {
        let idx = index as usize;
        let caller_offset = self.reader.get_offset();

        let function = self
            .env
            .functions
            .get_mut(idx)
            .ok_or_else(|| VmError::invalid(format!("function index {index} out of bounds")))?;
        function.call_count += 1;
        let call_count = function.call_count;
        let offset = function.offset;
        let length = function.length;
        let frame_size = function.frame_size();

        if call_count > self.jit_threshold && !self.compiled.contains_key(&idx) {
            self.reader.set_offset(offset)?;
            let compiled = self.jit.compile(&mut self.reader, length)?;
            self.compiled.insert(idx, Rc::new(compiled));
        }

        let compiled = self.compiled.get(&idx).cloned();
        let mut frame = Frame::new(frame_size);
        let result = match compiled {
            Some(compiled) => self.run_compiled(&compiled, &mut frame),
            None => {
                self.reader.set_offset(offset)?;
                self.run_block(length, &mut frame)
            }
        };
        frame.release(&mut self.env.heap);
        result?;

        self.reader.set_offset(caller_offset)
    }

    fn jump(&mut self, delta: i16) -> VmResult<()> {
        let target = self.reader.get_offset() as i64 + delta as i64;
        let target = u64::try_from(target)
            .map_err(|_| VmError::invalid("jump before the start of the stream"))?;
        self.reader.set_offset(target)
    }

    fn trace_op(&mut self, opcode: Opcode, operand: Option<i64>) -> VmResult<()> {
        if self.debug {
            match operand {
                Some(value) => writeln!(self.env.output, "{} {value}", opcode.mnemonic())?,
                None => writeln!(self.env.output, "{}", opcode.mnemonic())?,
            }
        }
        Ok(())
    }

    fn trace_compiled_op(&mut self, op: &CompiledOp) -> VmResult<()> {
        if self.debug {
            match op {
                CompiledOp::PushConst(i)
                | CompiledOp::PushLocal(i)
                | CompiledOp::PushGlobal(i)
                | CompiledOp::StoreLocal(i)
                | CompiledOp::StoreGlobal(i)
                | CompiledOp::Call(i)
                | CompiledOp::InitArray(i)
                | CompiledOp::IntrinsicCall(i) => {
                    writeln!(self.env.output, "{} {i}", op.mnemonic())?
                }
                CompiledOp::Jmp(t) | CompiledOp::JmpIfFalse(t) | CompiledOp::JmpIfTrue(t) => {
                    writeln!(self.env.output, "{} {t}", op.mnemonic())?
                }
                CompiledOp::NewArray(n) => writeln!(self.env.output, "{} {n}", op.mnemonic())?,
                _ => writeln!(self.env.output, "{}", op.mnemonic())?,
            }
        }
        Ok(())
    }

    fn trace_stack(&mut self) -> VmResult<()> {
        if self.debug {
            writeln!(self.env.output, "  stack size: {}", self.env.stack_size())?;
        }
        Ok(())
    }
}
