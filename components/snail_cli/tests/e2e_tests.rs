//! End-to-end process tests.
//!
//! Runs the compiled `shellvm` binary against bytecode files written to a
//! temporary directory and checks stdout, stderr and exit codes.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use bytecode_system::{Block, Opcode, ProgramBuilder};
use core_types::TypeTag;

fn write_image(image: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program.snail");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(image).unwrap();
    (dir, path)
}

fn shellvm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shellvm"))
}

#[test]
fn test_hello_program_halts_nonzero() {
    let image = ProgramBuilder::new()
        .const_string("hi")
        .intrinsic("println", 1, TypeTag::Void)
        .entry(
            Block::new()
                .with_index(Opcode::PushConst, 0)
                .with_index(Opcode::IntrinsicCall, 0)
                .op(Opcode::Halt)
                .into_bytes(),
        )
        .build();
    let (_dir, path) = write_image(&image);

    let output = shellvm().arg(&path).output().unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hi\n");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("HALT"));
}

#[test]
fn test_clean_completion_exits_zero() {
    let image = ProgramBuilder::new()
        .const_i32(2)
        .const_i32(3)
        .intrinsic("println", 1, TypeTag::Void)
        .entry(
            Block::new()
                .with_index(Opcode::PushConst, 0)
                .with_index(Opcode::PushConst, 1)
                .op(Opcode::Add)
                .with_index(Opcode::IntrinsicCall, 0)
                .into_bytes(),
        )
        .build();
    let (_dir, path) = write_image(&image);

    let output = shellvm().arg(&path).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "5\n");
}

#[test]
fn test_missing_file_fails() {
    let output = shellvm().arg("/no/such/file.snail").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wasn't found"));
}

#[test]
fn test_bad_magic_fails() {
    let mut image = ProgramBuilder::new().build();
    image[0] = 0x00;
    let (_dir, path) = write_image(&image);

    let output = shellvm().arg(&path).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid bytecode"));
}

#[test]
fn test_debug_flag_traces_instructions() {
    let image = ProgramBuilder::new()
        .const_i32(1)
        .intrinsic("println", 1, TypeTag::Void)
        .entry(
            Block::new()
                .with_index(Opcode::PushConst, 0)
                .with_index(Opcode::IntrinsicCall, 0)
                .into_bytes(),
        )
        .build();
    let (_dir, path) = write_image(&image);

    let output = shellvm().arg("-d").arg(&path).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PUSH_CONST 0"));
    assert!(stdout.contains("INTRINSIC_CALL 0"));
    assert!(stdout.contains("stack size: 0"));
    assert!(stdout.contains("1\n"));
}
