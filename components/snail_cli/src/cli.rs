//! Command-line argument surface.

use clap::Parser;
use std::path::PathBuf;

/// SnailVM bytecode runner.
#[derive(Debug, Parser)]
#[command(name = "shellvm", version, about = "Run a SnailVM bytecode file")]
pub struct Cli {
    /// Run the VM in debug configuration (per-instruction trace).
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// The bytecode file to run.
    pub file: PathBuf,
}
