//! SnailVM CLI.
//!
//! Entry point for the bytecode runner. Parses CLI arguments and
//! delegates to the Runtime for execution.

use clap::Parser;
use core_types::VmError;
use snail_cli::{Cli, CliError, Runtime};

fn main() {
    let cli = Cli::parse();

    let runtime = Runtime::new().with_debug(cli.debug);

    match runtime.execute_file(&cli.file) {
        Ok(()) => {}
        Err(CliError::FileNotFound(path)) => {
            eprintln!("Invalid arguments for ShellVM: {path} wasn't found");
            std::process::exit(1);
        }
        Err(CliError::VmError(VmError::Halt(message))) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
