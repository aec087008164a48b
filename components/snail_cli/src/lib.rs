//! SnailVM CLI library.
//!
//! Provides the argument surface and the Runtime orchestrator used by the
//! `shellvm` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::Runtime;
