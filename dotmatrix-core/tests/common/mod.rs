//! Shared helpers for the ROM-driven conformance suites.
//!
//! The suites need test archives that cannot ship with the repository;
//! each one locates its directory through an environment variable and
//! skips (with a note) when it is not set, so `cargo test` stays green
//! on machines without the ROMs.

// Each suite binary compiles its own copy of this module and none of
// them uses every helper.
#![allow(dead_code)]

use std::path::PathBuf;

use dotmatrix_core::Emulator;

pub fn suite_directory(environment_variable: &str) -> Option<PathBuf> {
    let Some(directory) = std::env::var_os(environment_variable) else {
        eprintln!("skipping: set {environment_variable} to the test-suite directory to run this");
        return None;
    };
    let directory = PathBuf::from(directory);
    assert!(
        directory.is_dir(),
        "{environment_variable} points at {}, which is not a directory",
        directory.display()
    );
    Some(directory)
}

pub fn emulator_with_rom(rom: &[u8]) -> Emulator {
    let mut emulator = Emulator::new();
    emulator
        .load_game_rom(rom)
        .unwrap_or_else(|error| panic!("test ROM rejected: {error}"));
    emulator.set_post_boot_state();
    emulator
}

/// Mooneye ROMs execute `LD B, B` when they are done and leave either
/// the Fibonacci sentinel or 0x42 everywhere in the register file.
pub fn run_to_mooneye_breakpoint(emulator: &mut Emulator, instruction_budget: u64) -> bool {
    for _ in 0..instruction_budget {
        if emulator.instruction_register() == 0x40 {
            return true;
        }
        if let Err(fault) = emulator.step_single_instruction() {
            panic!("{fault}");
        }
    }
    false
}

pub fn assert_fibonacci_sentinel(emulator: &Emulator, rom_name: &str) {
    let registers = emulator.register_file();
    let observed = (
        registers.b, registers.c, registers.d, registers.e, registers.h, registers.l,
    );
    assert_eq!(
        (3, 5, 8, 13, 21, 34),
        observed,
        "{rom_name} reported failure (registers {observed:02x?})"
    );
}
