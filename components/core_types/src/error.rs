//! VM error taxonomy.
//!
//! Four kinds of failure exist at runtime: structurally or semantically
//! invalid bytecode, running out of input bytes mid-field, the HALT
//! instruction, and host I/O failures. None of them is recovered inside
//! the interpreter; they unwind to the top level.

use std::fmt;
use std::io;

/// An error raised by the loader or the interpreter.
#[derive(Debug)]
pub enum VmError {
    /// Structural or semantic defect in the input bytecode: bad magic,
    /// unknown constant-pool tag, unknown opcode, type-illegal operation,
    /// unsupported intrinsic.
    InvalidBytecode(String),

    /// The reader ran out of bytes in the middle of a field.
    UnexpectedEof,

    /// The HALT instruction was executed; unwinds through all pending
    /// calls.
    Halt(String),

    /// I/O failure in the host: file reads or intrinsic output.
    HostIo(io::Error),
}

impl VmError {
    /// Shorthand for an [`VmError::InvalidBytecode`] with the given message.
    pub fn invalid(message: impl Into<String>) -> Self {
        VmError::InvalidBytecode(message.into())
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::InvalidBytecode(msg) => write!(f, "invalid bytecode: {msg}"),
            VmError::UnexpectedEof => write!(f, "unexpected end of bytecode"),
            VmError::Halt(msg) => write!(f, "{msg}"),
            VmError::HostIo(e) => write!(f, "host I/O error: {e}"),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::HostIo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VmError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            VmError::UnexpectedEof
        } else {
            VmError::HostIo(err)
        }
    }
}

/// Result type used across the VM.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_shorthand() {
        let err = VmError::invalid("bad magic");
        assert!(matches!(err, VmError::InvalidBytecode(ref m) if m == "bad magic"));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            VmError::invalid("Unexpected type in constant pool").to_string(),
            "invalid bytecode: Unexpected type in constant pool"
        );
        assert_eq!(VmError::UnexpectedEof.to_string(), "unexpected end of bytecode");
        assert_eq!(
            VmError::Halt("HALT command found in bytecode!".to_string()).to_string(),
            "HALT command found in bytecode!"
        );
    }

    #[test]
    fn test_io_eof_maps_to_unexpected_eof() {
        let err: VmError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, VmError::UnexpectedEof));
    }

    #[test]
    fn test_io_other_maps_to_host_io() {
        let err: VmError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, VmError::HostIo(_)));
    }
}
