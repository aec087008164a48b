//! Error types for the CLI.

use core_types::VmError;
use std::fmt;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// The bytecode file does not exist or cannot be opened.
    FileNotFound(String),

    /// Load or execution failure inside the VM.
    VmError(VmError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::FileNotFound(path) => write!(f, "{path} wasn't found"),
            CliError::VmError(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::VmError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VmError> for CliError {
    fn from(err: VmError) -> Self {
        CliError::VmError(err)
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
