//! Section loader.
//!
//! Consumes a [`BinaryReader`] positioned at file start and produces the
//! initial [`Program`]. The five sections are parsed in fixed order:
//! header, constant pool, globals, function table, intrinsic table; a
//! trailing u32 gives the entry-block length. Any deviation fails with
//! `InvalidBytecode`.

use std::io::{Read, Seek};

use core_types::{TypeTag, VmError, VmResult};
use memory_manager::{Heap, Link};

use crate::program::{Function, Header, Intrinsic, Program, MAGIC};
use crate::reader::BinaryReader;

/// Parse a complete bytecode prelude into a [`Program`].
///
/// Constant-pool entries and pre-allocated array globals are created on
/// the given heap. On return the reader is positioned at the first byte
/// of the entry block.
pub fn load<R: Read + Seek>(reader: &mut BinaryReader<R>, heap: &mut Heap) -> VmResult<Program> {
    let header = read_header(reader)?;
    let pool = read_constants(reader, heap)?;
    let globals = read_globals(reader, heap)?;
    let functions = read_functions(reader)?;
    let intrinsics = read_intrinsics(reader)?;
    let entry_length = reader.read_u32()?;

    Ok(Program {
        header,
        pool,
        globals,
        functions,
        intrinsics,
        entry_length,
    })
}

fn read_header<R: Read + Seek>(reader: &mut BinaryReader<R>) -> VmResult<Header> {
    let header = Header {
        magic: reader.read_u32()?,
        version: reader.read_u16()?,
        main_function_index: reader.read_u16()?,
    };
    if header.magic != MAGIC {
        return Err(VmError::invalid("Magic constant is invalid!"));
    }
    Ok(header)
}

fn read_constants<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    heap: &mut Heap,
) -> VmResult<Vec<memory_manager::Handle>> {
    let size = reader.read_u16()?;
    let mut pool = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let id = reader.read_byte()?;
        let handle = match id {
            0x01 | 0x02 => {
                // Big-endian on the wire, little-endian in memory.
                let value = reader.read_u32()?;
                heap.create_bytes(TypeTag::from_byte(id)?, value.to_le_bytes().to_vec())
            }
            0x03 => {
                let length = reader.read_u16()?;
                let bytes = reader.read_bytes(length as usize)?;
                heap.create_bytes(TypeTag::String, bytes)
            }
            _ => return Err(VmError::invalid("Unexpected type in constant pool")),
        };
        // The pool keeps its entries alive for the VM's lifetime.
        heap.retain(handle);
        pool.push(handle);
    }
    Ok(pool)
}

fn read_globals<R: Read + Seek>(
    reader: &mut BinaryReader<R>,
    heap: &mut Heap,
) -> VmResult<Vec<Link>> {
    let size = reader.read_u16()?;
    let mut globals = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let name_length = reader.read_byte()?;
        reader.skip(name_length as usize)?;
        let tag = TypeTag::from_byte(reader.read_byte()?)?;
        let mut link = Link::null();
        if tag == TypeTag::Array {
            let element_count = reader.read_u32()?;
            let _element_type = reader.read_byte()?;
            let array = heap.create_array(element_count as usize);
            heap.assign_link(&mut link, array);
        }
        globals.push(link);
    }
    Ok(globals)
}

fn read_functions<R: Read + Seek>(reader: &mut BinaryReader<R>) -> VmResult<Vec<Function>> {
    let size = reader.read_u16()?;
    let mut functions = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let name_length = reader.read_byte()?;
        reader.skip(name_length as usize)?;
        let arg_count = reader.read_byte()?;
        let return_type = TypeTag::from_byte(reader.read_byte()?)?;
        let local_count = reader.read_u16()?;
        let length = reader.read_u32()?;
        let offset = reader.get_offset();
        reader.skip(length as usize)?;
        functions.push(Function {
            offset,
            return_type,
            arg_count,
            local_count,
            length,
            call_count: 0,
        });
    }
    Ok(functions)
}

fn read_intrinsics<R: Read + Seek>(reader: &mut BinaryReader<R>) -> VmResult<Vec<Intrinsic>> {
    let size = reader.read_u16()?;
    let mut intrinsics = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let name_length = reader.read_byte()?;
        let name_bytes = reader.read_bytes(name_length as usize)?;
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        let arg_count = reader.read_byte()?;
        let return_type = TypeTag::from_byte(reader.read_byte()?)?;
        intrinsics.push(Intrinsic {
            return_type,
            arg_count,
            name,
        });
    }
    Ok(intrinsics)
}
