//! Buffered binary reader over the bytecode stream.
//!
//! The reader is a big-endian-aware, seekable byte cursor. It keeps a
//! fixed-size buffer and refills it exactly when the intra-buffer position
//! reaches the buffered limit; the absolute position is always the number
//! of bytes consumed before the current buffer plus the position inside it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use core_types::{VmError, VmResult};

const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Big-endian streaming cursor over a bytecode stream with seek support.
pub struct BinaryReader<R: Read + Seek> {
    input: R,
    buffer: Vec<u8>,
    limit: usize,
    pos: usize,
    absolute_pos: u64,
}

impl BinaryReader<File> {
    /// Open a bytecode file for reading.
    pub fn open(path: impl AsRef<Path>) -> VmResult<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Wrap a readable, seekable stream positioned at its start.
    pub fn new(input: R) -> Self {
        BinaryReader {
            input,
            buffer: vec![0; DEFAULT_BUFFER_SIZE],
            limit: 0,
            pos: 0,
            absolute_pos: 0,
        }
    }

    /// Read the next byte, failing with `UnexpectedEof` past the end.
    pub fn read_byte(&mut self) -> VmResult<u8> {
        self.refill_buffer()?;
        if self.pos >= self.limit {
            return Err(VmError::UnexpectedEof);
        }
        let byte = self.buffer[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Consume two bytes as a big-endian unsigned integer.
    pub fn read_u16(&mut self) -> VmResult<u16> {
        Ok(u16::from_be_bytes([self.read_byte()?, self.read_byte()?]))
    }

    /// Consume four bytes as a big-endian unsigned integer.
    pub fn read_u32(&mut self) -> VmResult<u32> {
        Ok(u32::from_be_bytes([
            self.read_byte()?,
            self.read_byte()?,
            self.read_byte()?,
            self.read_byte()?,
        ]))
    }

    /// Consume two bytes as a big-endian signed integer (jump deltas).
    pub fn read_i16(&mut self) -> VmResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Consume exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> VmResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(n);
        for _ in 0..n {
            bytes.push(self.read_byte()?);
        }
        Ok(bytes)
    }

    /// Advance the cursor by `n` bytes without interpreting them.
    pub fn skip(&mut self, n: usize) -> VmResult<()> {
        for _ in 0..n {
            self.read_byte()?;
        }
        Ok(())
    }

    /// Absolute byte position from the start of the stream.
    pub fn get_offset(&self) -> u64 {
        self.absolute_pos + self.pos as u64
    }

    /// Seek to an absolute position; subsequent reads start there.
    ///
    /// Any pending buffer contents are invalidated.
    pub fn set_offset(&mut self, pos: u64) -> VmResult<()> {
        self.input.seek(SeekFrom::Start(pos))?;
        self.limit = 0;
        self.pos = 0;
        self.absolute_pos = pos;
        Ok(())
    }

    fn refill_buffer(&mut self) -> VmResult<()> {
        if self.pos < self.limit {
            return Ok(());
        }
        self.absolute_pos += self.limit as u64;
        let bytes_read = self.input.read(&mut self.buffer)?;
        self.limit = bytes_read;
        self.pos = 0;
        Ok(())
    }
}
