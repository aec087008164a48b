//! The shared execution environment.
//!
//! One [`Environment`] lives for the whole program run: the constant pool,
//! global slots, function and intrinsic tables, the heap, the operand
//! stack and the output sink. Every push and pop on the operand stack runs
//! the link-count bookkeeping, so anything reachable from the stack stays
//! alive across allocations.

use std::io::Write;

use bytecode_system::{Function, Intrinsic, Opcode, Program};
use core_types::{TypeTag, VmError, VmResult};
use memory_manager::{Handle, Heap, Link, Object};

use crate::call_frame::Frame;

/// Aggregate state shared across the entire program run.
pub struct Environment {
    pub(crate) pool: Vec<Handle>,
    pub(crate) globals: Vec<Link>,
    pub(crate) functions: Vec<Function>,
    pub(crate) intrinsics: Vec<Intrinsic>,
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Handle>,
    pub(crate) output: Box<dyn Write>,
}

impl Environment {
    /// Assemble the environment from a loaded program and the heap its
    /// constants live on. Intrinsic and trace output goes to `output`.
    pub fn new(program: Program, heap: Heap, output: Box<dyn Write>) -> Self {
        Environment {
            pool: program.pool,
            globals: program.globals,
            functions: program.functions,
            intrinsics: program.intrinsics,
            heap,
            stack: Vec::new(),
            output,
        }
    }

    /// Current operand-stack depth.
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// The heap owning every object of this run.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn obj(&self, handle: Handle) -> VmResult<&Object> {
        self.heap
            .get(handle)
            .ok_or_else(|| VmError::invalid("dangling object reference"))
    }

    /// Push a reference, incrementing the target's link count.
    pub(crate) fn push(&mut self, handle: Handle) {
        self.heap.retain(handle);
        self.stack.push(handle);
    }

    /// Pop a reference, decrementing the target's link count.
    pub(crate) fn pop(&mut self) -> VmResult<Handle> {
        let handle = self
            .stack
            .pop()
            .ok_or_else(|| VmError::invalid("operand stack underflow"))?;
        self.heap.release(handle);
        Ok(handle)
    }

    pub(crate) fn peek(&self) -> VmResult<Handle> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| VmError::invalid("operand stack underflow"))
    }

    pub(crate) fn truthy(&self, handle: Handle) -> VmResult<bool> {
        Ok(self.obj(handle)?.is_truthy())
    }

    // ---- stack / memory instructions ----------------------------------

    pub(crate) fn exec_push_const(&mut self, index: u16) -> VmResult<()> {
        let handle = self
            .pool
            .get(index as usize)
            .copied()
            .ok_or_else(|| VmError::invalid(format!("constant index {index} out of bounds")))?;
        self.push(handle);
        Ok(())
    }

    pub(crate) fn exec_push_local(&mut self, frame: &Frame, index: u16) -> VmResult<()> {
        let handle = frame
            .get(index as usize)?
            .ok_or_else(|| VmError::invalid(format!("use of unset local {index}")))?;
        self.push(handle);
        Ok(())
    }

    pub(crate) fn exec_push_global(&mut self, index: u16) -> VmResult<()> {
        let link = self
            .globals
            .get(index as usize)
            .ok_or_else(|| VmError::invalid(format!("global index {index} out of bounds")))?;
        let handle = link
            .target()
            .ok_or_else(|| VmError::invalid(format!("use of unset global {index}")))?;
        self.push(handle);
        Ok(())
    }

    pub(crate) fn exec_store_local(&mut self, frame: &mut Frame, index: u16) -> VmResult<()> {
        let handle = self.pop()?;
        self.heap.assign_link(frame.link_mut(index as usize)?, handle);
        Ok(())
    }

    pub(crate) fn exec_store_global(&mut self, index: u16) -> VmResult<()> {
        let handle = self.pop()?;
        let link = self
            .globals
            .get_mut(index as usize)
            .ok_or_else(|| VmError::invalid(format!("global index {index} out of bounds")))?;
        self.heap.assign_link(link, handle);
        Ok(())
    }

    pub(crate) fn exec_pop(&mut self) -> VmResult<()> {
        self.pop()?;
        Ok(())
    }

    pub(crate) fn exec_dup(&mut self) -> VmResult<()> {
        let top = self.peek()?;
        self.push(top);
        Ok(())
    }

    // ---- arithmetic ----------------------------------------------------

    /// Pop right then left, dispatch on the wider operand tag, push a
    /// freshly allocated result.
    ///
    /// Mixed I32/USIZE operands are reinterpreted through the result
    /// type's accessor; both payloads are four bytes, so the
    /// reinterpretation is well defined. Strings support ADD only
    /// (concatenation of the raw payloads).
    pub(crate) fn arithmetic(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result_tag = self.obj(left)?.tag.max(self.obj(right)?.tag);

        let result = match result_tag {
            TypeTag::I32 => {
                let a = self.payload_i32(left)?;
                let b = self.payload_i32(right)?;
                let value = match op {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    Opcode::Mul => a.wrapping_mul(b),
                    Opcode::Div => a.wrapping_div(self.nonzero_i32(op, b)?),
                    Opcode::Mod => a.wrapping_rem(self.nonzero_i32(op, b)?),
                    _ => return Err(VmError::invalid("not an arithmetic opcode")),
                };
                self.heap
                    .create_bytes(TypeTag::I32, value.to_le_bytes().to_vec())
            }
            TypeTag::Usize => {
                let a = self.payload_u32(left)?;
                let b = self.payload_u32(right)?;
                let value = match op {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Sub => a.wrapping_sub(b),
                    Opcode::Mul => a.wrapping_mul(b),
                    Opcode::Div if b != 0 => a / b,
                    Opcode::Mod if b != 0 => a % b,
                    Opcode::Div | Opcode::Mod => {
                        return Err(VmError::invalid(format!(
                            "{} by zero",
                            op.mnemonic()
                        )))
                    }
                    _ => return Err(VmError::invalid("not an arithmetic opcode")),
                };
                self.heap
                    .create_bytes(TypeTag::Usize, value.to_le_bytes().to_vec())
            }
            TypeTag::String if op == Opcode::Add => {
                let mut bytes = self.payload_bytes(left)?.to_vec();
                bytes.extend_from_slice(self.payload_bytes(right)?);
                self.heap.create_bytes(TypeTag::String, bytes)
            }
            _ => {
                return Err(VmError::invalid(format!(
                    "{} is not defined for these operand types",
                    op.mnemonic()
                )))
            }
        };

        self.push(result);
        Ok(())
    }

    // ---- comparison ----------------------------------------------------

    /// Pop right then left, push a fresh I32 holding 0 or 1.
    ///
    /// Equality is tag equality plus byte-exact payload equality;
    /// ordering is defined for the integer types only, dispatched on the
    /// wider tag.
    pub(crate) fn comparison(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match op {
            Opcode::Eq => self.obj(left)?.value_eq(self.obj(right)?),
            Opcode::Neq => !self.obj(left)?.value_eq(self.obj(right)?),
            _ => {
                let result_tag = self.obj(left)?.tag.max(self.obj(right)?.tag);
                match result_tag {
                    TypeTag::I32 => {
                        let a = self.payload_i32(left)?;
                        let b = self.payload_i32(right)?;
                        Self::ordering(op, a, b)?
                    }
                    TypeTag::Usize => {
                        let a = self.payload_u32(left)?;
                        let b = self.payload_u32(right)?;
                        Self::ordering(op, a, b)?
                    }
                    _ => {
                        return Err(VmError::invalid(format!(
                            "{} is not defined for these operand types",
                            op.mnemonic()
                        )))
                    }
                }
            }
        };

        self.push_bool(result);
        Ok(())
    }

    fn ordering<T: PartialOrd>(op: Opcode, a: T, b: T) -> VmResult<bool> {
        match op {
            Opcode::Lt => Ok(a < b),
            Opcode::Le => Ok(a <= b),
            Opcode::Gt => Ok(a > b),
            Opcode::Gte => Ok(a >= b),
            _ => Err(VmError::invalid("not a comparison opcode")),
        }
    }

    // ---- logical -------------------------------------------------------

    pub(crate) fn logical_binary(&mut self, op: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let a = self.truthy(left)?;
        let b = self.truthy(right)?;
        let result = match op {
            Opcode::And => a && b,
            Opcode::Or => a || b,
            _ => return Err(VmError::invalid("not a logical opcode")),
        };
        self.push_bool(result);
        Ok(())
    }

    pub(crate) fn logical_not(&mut self) -> VmResult<()> {
        let operand = self.pop()?;
        let result = !self.truthy(operand)?;
        self.push_bool(result);
        Ok(())
    }

    // ---- arrays --------------------------------------------------------

    pub(crate) fn exec_new_array(&mut self, element_count: u32) -> VmResult<()> {
        let array = self.heap.create_array(element_count as usize);
        self.push(array);
        Ok(())
    }

    pub(crate) fn exec_get_array(&mut self) -> VmResult<()> {
        let index = self.pop()?;
        let array = self.pop()?;
        let index = self.payload_u32(index)? as usize;
        let element = self
            .heap
            .slot(array, index)?
            .ok_or_else(|| VmError::invalid(format!("read of null array element {index}")))?;
        self.push(element);
        Ok(())
    }

    pub(crate) fn exec_set_array(&mut self) -> VmResult<()> {
        let index = self.pop()?;
        let value = self.pop()?;
        let array = self.pop()?;
        let index = self.payload_u32(index)? as usize;
        self.heap.assign_slot(array, index, value)
    }

    /// Pop `count` values (the first popped becomes slot 0), pop the
    /// target array, fill its slots, push the array back.
    pub(crate) fn exec_init_array(&mut self, count: u16) -> VmResult<()> {
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.pop()?);
        }
        let array = self.pop()?;
        for (slot, value) in values.into_iter().enumerate() {
            self.heap.assign_slot(array, slot, value)?;
        }
        self.push(array);
        Ok(())
    }

    // ---- intrinsics ----------------------------------------------------

    pub(crate) fn exec_intrinsic(&mut self, index: u16) -> VmResult<()> {
        let name = self
            .intrinsics
            .get(index as usize)
            .ok_or_else(|| VmError::invalid(format!("intrinsic index {index} out of bounds")))?
            .name
            .clone();
        match name.as_str() {
            "println" => {
                let handle = self.pop()?;
                let text = self.coerce_string(handle)?;
                writeln!(self.output, "{text}")?;
                Ok(())
            }
            _ => Err(VmError::invalid("Unsupported intrinsic function")),
        }
    }

    /// STRING coercion for printing: decimal for the integer types, raw
    /// bytes for strings, a bracketed recursive rendering for arrays with
    /// `...` marking null slots.
    pub(crate) fn coerce_string(&self, handle: Handle) -> VmResult<String> {
        let obj = self.obj(handle)?;
        Ok(match obj.tag {
            TypeTag::Void => String::new(),
            TypeTag::I32 => self.payload_i32(handle)?.to_string(),
            TypeTag::Usize => self.payload_u32(handle)?.to_string(),
            TypeTag::String => {
                String::from_utf8_lossy(self.payload_bytes(handle)?).into_owned()
            }
            TypeTag::Array => {
                let slots = obj
                    .slots()
                    .ok_or_else(|| VmError::invalid("malformed array payload"))?;
                let mut rendered = Vec::with_capacity(slots.len());
                for link in slots {
                    rendered.push(match link.target() {
                        Some(element) => self.coerce_string(element)?,
                        None => "...".to_string(),
                    });
                }
                format!("[{}]", rendered.join(", "))
            }
        })
    }

    // ---- payload accessors ---------------------------------------------

    fn push_bool(&mut self, value: bool) {
        let bytes = (value as i32).to_le_bytes().to_vec();
        let result = self.heap.create_bytes(TypeTag::I32, bytes);
        self.push(result);
    }

    fn nonzero_i32(&self, op: Opcode, divisor: i32) -> VmResult<i32> {
        if divisor == 0 {
            Err(VmError::invalid(format!("{} by zero", op.mnemonic())))
        } else {
            Ok(divisor)
        }
    }

    fn payload_i32(&self, handle: Handle) -> VmResult<i32> {
        self.obj(handle)?
            .as_i32()
            .ok_or_else(|| VmError::invalid("expected a 4-byte integer payload"))
    }

    fn payload_u32(&self, handle: Handle) -> VmResult<u32> {
        self.obj(handle)?
            .as_u32()
            .ok_or_else(|| VmError::invalid("expected a 4-byte integer payload"))
    }

    fn payload_bytes(&self, handle: Handle) -> VmResult<&[u8]> {
        self.obj(handle)?
            .payload()
            .ok_or_else(|| VmError::invalid("expected a byte payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_env() -> Environment {
        let program = Program {
            header: bytecode_system::Header {
                magic: bytecode_system::MAGIC,
                version: 1,
                main_function_index: 0,
            },
            pool: Vec::new(),
            globals: vec![Link::null(), Link::null()],
            functions: Vec::new(),
            intrinsics: vec![Intrinsic {
                return_type: TypeTag::Void,
                arg_count: 1,
                name: "println".to_string(),
            }],
            entry_length: 0,
        };
        Environment::new(program, Heap::new(), Box::new(std::io::sink()))
    }

    fn push_i32(env: &mut Environment, value: i32) -> Handle {
        let handle = env
            .heap
            .create_bytes(TypeTag::I32, value.to_le_bytes().to_vec());
        env.push(handle);
        handle
    }

    fn push_u32(env: &mut Environment, value: u32) -> Handle {
        let handle = env
            .heap
            .create_bytes(TypeTag::Usize, value.to_le_bytes().to_vec());
        env.push(handle);
        handle
    }

    fn push_string(env: &mut Environment, value: &str) -> Handle {
        let handle = env
            .heap
            .create_bytes(TypeTag::String, value.as_bytes().to_vec());
        env.push(handle);
        handle
    }

    fn pop_i32(env: &mut Environment) -> i32 {
        let handle = env.pop().unwrap();
        env.obj(handle).unwrap().as_i32().unwrap()
    }

    #[test]
    fn test_push_pop_adjusts_link_counts() {
        let mut env = empty_env();
        let handle = push_i32(&mut env, 7);
        assert_eq!(env.obj(handle).unwrap().link_count, 1);
        env.exec_dup().unwrap();
        assert_eq!(env.obj(handle).unwrap().link_count, 2);
        env.pop().unwrap();
        env.pop().unwrap();
        assert_eq!(env.obj(handle).unwrap().link_count, 0);
    }

    #[test]
    fn test_signed_arithmetic() {
        let mut env = empty_env();
        for (op, expected) in [
            (Opcode::Add, 5),
            (Opcode::Sub, -1),
            (Opcode::Mul, 6),
            (Opcode::Div, 0),
            (Opcode::Mod, 2),
        ] {
            push_i32(&mut env, 2);
            push_i32(&mut env, 3);
            env.arithmetic(op).unwrap();
            assert_eq!(pop_i32(&mut env), expected, "{}", op.mnemonic());
        }
    }

    #[test]
    fn test_division_by_zero_rejected() {
        let mut env = empty_env();
        push_i32(&mut env, 1);
        push_i32(&mut env, 0);
        assert!(env.arithmetic(Opcode::Div).is_err());
    }

    #[test]
    fn test_unsigned_dispatch_on_wider_tag() {
        let mut env = empty_env();
        // I32 -1 mixed with USIZE 1 dispatches as USIZE and reinterprets
        // the I32 payload bits.
        push_i32(&mut env, -1);
        push_u32(&mut env, 1);
        env.arithmetic(Opcode::Add).unwrap();
        let handle = env.pop().unwrap();
        let obj = env.obj(handle).unwrap();
        assert_eq!(obj.tag, TypeTag::Usize);
        assert_eq!(obj.as_u32(), Some(0));
    }

    #[test]
    fn test_string_concatenation() {
        let mut env = empty_env();
        push_string(&mut env, "snail");
        push_string(&mut env, "vm");
        env.arithmetic(Opcode::Add).unwrap();
        let handle = env.pop().unwrap();
        assert_eq!(env.obj(handle).unwrap().payload(), Some(b"snailvm".as_slice()));
    }

    #[test]
    fn test_string_subtraction_rejected() {
        let mut env = empty_env();
        push_string(&mut env, "a");
        push_string(&mut env, "b");
        assert!(env.arithmetic(Opcode::Sub).is_err());
    }

    #[test]
    fn test_arithmetic_result_is_fresh_object() {
        let mut env = empty_env();
        let a = push_i32(&mut env, 2);
        let b = push_i32(&mut env, 3);
        env.arithmetic(Opcode::Add).unwrap();
        let result = env.peek().unwrap();
        assert_ne!(result, a);
        assert_ne!(result, b);
    }

    #[test]
    fn test_equality_requires_matching_tags() {
        let mut env = empty_env();
        push_i32(&mut env, 2);
        push_u32(&mut env, 2);
        env.comparison(Opcode::Eq).unwrap();
        assert_eq!(pop_i32(&mut env), 0);

        push_i32(&mut env, 2);
        push_i32(&mut env, 2);
        env.comparison(Opcode::Eq).unwrap();
        assert_eq!(pop_i32(&mut env), 1);
    }

    #[test]
    fn test_signed_ordering() {
        let mut env = empty_env();
        push_i32(&mut env, -5678);
        push_i32(&mut env, 100_000);
        env.comparison(Opcode::Lt).unwrap();
        assert_eq!(pop_i32(&mut env), 1);

        push_i32(&mut env, 100_000);
        push_i32(&mut env, -5678);
        env.comparison(Opcode::Gte).unwrap();
        assert_eq!(pop_i32(&mut env), 1);
    }

    #[test]
    fn test_ordering_on_strings_rejected() {
        let mut env = empty_env();
        push_string(&mut env, "a");
        push_string(&mut env, "b");
        assert!(env.comparison(Opcode::Lt).is_err());
    }

    #[test]
    fn test_logical_operations() {
        let mut env = empty_env();
        push_i32(&mut env, 1);
        push_i32(&mut env, 0);
        env.logical_binary(Opcode::And).unwrap();
        assert_eq!(pop_i32(&mut env), 0);

        push_i32(&mut env, 1);
        push_i32(&mut env, 0);
        env.logical_binary(Opcode::Or).unwrap();
        assert_eq!(pop_i32(&mut env), 1);

        push_i32(&mut env, 0);
        env.logical_not().unwrap();
        assert_eq!(pop_i32(&mut env), 1);
    }

    #[test]
    fn test_store_and_push_global() {
        let mut env = empty_env();
        push_i32(&mut env, 9);
        env.exec_store_global(0).unwrap();
        assert_eq!(env.stack_size(), 0);

        env.exec_push_global(0).unwrap();
        assert_eq!(pop_i32(&mut env), 9);
    }

    #[test]
    fn test_push_unset_global_rejected() {
        let mut env = empty_env();
        assert!(env.exec_push_global(1).is_err());
        assert!(env.exec_push_global(99).is_err());
    }

    #[test]
    fn test_store_and_push_local() {
        let mut env = empty_env();
        let mut frame = Frame::new(2);
        push_i32(&mut env, 21);
        env.exec_store_local(&mut frame, 0).unwrap();
        env.exec_push_local(&frame, 0).unwrap();
        env.exec_push_local(&frame, 0).unwrap();
        env.arithmetic(Opcode::Add).unwrap();
        assert_eq!(pop_i32(&mut env), 42);
        frame.release(&mut env.heap);
    }

    #[test]
    fn test_init_array_pop_order() {
        let mut env = empty_env();
        env.exec_new_array(3).unwrap();
        push_i32(&mut env, 10);
        push_i32(&mut env, 20);
        push_i32(&mut env, 30);
        // First popped (30) becomes slot 0.
        env.exec_init_array(3).unwrap();

        let array = env.peek().unwrap();
        let first = env.heap.slot(array, 0).unwrap().unwrap();
        let last = env.heap.slot(array, 2).unwrap().unwrap();
        assert_eq!(env.obj(first).unwrap().as_i32(), Some(30));
        assert_eq!(env.obj(last).unwrap().as_i32(), Some(10));
    }

    #[test]
    fn test_get_and_set_array() {
        let mut env = empty_env();
        env.exec_new_array(2).unwrap();
        let array = env.peek().unwrap();

        env.exec_dup().unwrap();
        push_i32(&mut env, 77);
        push_i32(&mut env, 1);
        env.exec_set_array().unwrap();
        assert_eq!(env.peek().unwrap(), array);

        env.exec_dup().unwrap();
        push_i32(&mut env, 1);
        env.exec_get_array().unwrap();
        assert_eq!(pop_i32(&mut env), 77);
    }

    #[test]
    fn test_get_null_array_element_rejected() {
        let mut env = empty_env();
        env.exec_new_array(2).unwrap();
        push_i32(&mut env, 0);
        assert!(env.exec_get_array().is_err());
    }

    #[test]
    fn test_unsupported_intrinsic_rejected() {
        let mut env = empty_env();
        env.intrinsics.push(Intrinsic {
            return_type: TypeTag::Void,
            arg_count: 0,
            name: "read_line".to_string(),
        });
        let err = env.exec_intrinsic(1).unwrap_err();
        assert!(matches!(
            err,
            VmError::InvalidBytecode(ref m) if m == "Unsupported intrinsic function"
        ));
    }

    #[test]
    fn test_string_coercion() {
        let mut env = empty_env();
        let n = push_i32(&mut env, -3);
        assert_eq!(env.coerce_string(n).unwrap(), "-3");

        let u = push_u32(&mut env, 3_000_000_000);
        assert_eq!(env.coerce_string(u).unwrap(), "3000000000");

        let s = push_string(&mut env, "hi");
        assert_eq!(env.coerce_string(s).unwrap(), "hi");
    }

    #[test]
    fn test_array_coercion_marks_null_slots() {
        let mut env = empty_env();
        let array = env.heap.create_array(3);
        env.push(array);
        let v = env.heap.create_bytes(TypeTag::I32, 20i32.to_le_bytes().to_vec());
        env.heap.assign_slot(array, 1, v).unwrap();
        assert_eq!(env.coerce_string(array).unwrap(), "[..., 20, ...]");
    }
}
