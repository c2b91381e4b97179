//! Cycle-accurate DMG (original Game Boy) emulator core.
//!
//! The CPU drives time: every machine cycle it spends goes through the
//! MMU's bus implementation, which advances the timer by one M-cycle,
//! the PPU by four dots and the OAM-DMA engine by one transfer step
//! before the access is observed. Host-facing state (frame buffers,
//! joypad masks, control flags) is shared through atomics so a display
//! and input thread can run alongside the worker that calls
//! [`Emulator::step_single_instruction`].

pub mod cartridge;
pub mod cpu;
pub mod dma;
mod error;
pub mod frame;
pub mod joypad;
pub mod mmu;
pub mod ppu;
pub mod shared;
pub mod timer;

use std::path::Path;
use std::sync::Arc;

pub use error::{Fault, LoadError};

use crate::cpu::{Cpu, RegisterFile};
use crate::frame::FrameBuffers;
use crate::joypad::JoypadState;
use crate::mmu::{AccessSource, Mmu};
use crate::shared::SharedControls;

pub const WIDTH: u8 = 160;
pub const HEIGHT: u8 = 144;

pub struct Emulator {
    cpu: Cpu,
    mmu: Mmu,
    joypad_state: Arc<JoypadState>,
    frames: Arc<FrameBuffers>,
    controls: Arc<SharedControls>,
    fault: Option<Fault>,
}

impl Default for Emulator {
    fn default() -> Self {
        let joypad_state = Arc::new(JoypadState::default());
        let frames = Arc::new(FrameBuffers::new());
        Self {
            cpu: Cpu::default(),
            mmu: Mmu::new(Arc::clone(&joypad_state), Arc::clone(&frames)),
            joypad_state,
            frames,
            controls: Arc::new(SharedControls::default()),
            fault: None,
        }
    }
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Power-on state. Loaded ROM images stay in place; every register
    /// and hidden timing counter goes back to zero. Components reset in
    /// the fixed order timer, PPU, MMU, CPU.
    pub fn reset_state(&mut self, with_startup_cycle: bool) {
        self.mmu.timer.reset_state();
        self.mmu.ppu.reset_state();
        self.mmu.cartridge.reset_state();
        self.mmu.reset_state();
        self.cpu.reset_state(with_startup_cycle);
        self.fault = None;
    }

    /// The state a real DMG hands to cartridge code after its internal
    /// boot ROM finishes, including the header-checksum-dependent flags.
    pub fn set_post_boot_state(&mut self) {
        let header_checksum_nonzero = self.mmu.cartridge.header_checksum_nonzero();
        self.mmu.timer.set_post_boot_state();
        self.mmu.ppu.set_post_boot_state();
        self.mmu.cartridge.reset_state();
        self.mmu.set_post_boot_state();
        self.cpu.set_post_boot_state(header_checksum_nonzero);
        self.fault = None;
    }

    /// Run one CPU instruction; timer, PPU and DMA advance in lockstep
    /// underneath. After a fatal fault the core refuses to step until a
    /// reset.
    pub fn step_single_instruction(&mut self) -> Result<(), Fault> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        match self.cpu.step_single_instruction(&mut self.mmu) {
            Ok(()) => Ok(()),
            Err(fault) => {
                log::warn!("{fault}");
                self.fault = Some(fault);
                Err(fault)
            }
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    // Loading

    pub fn load_game_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.mmu.cartridge = cartridge::CartridgeSlot::load(bytes)?;
        Ok(())
    }

    pub fn load_game_rom_from_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let bytes = std::fs::read(path)?;
        self.load_game_rom(&bytes)
    }

    pub fn unload_game_rom(&mut self) {
        self.mmu.cartridge = cartridge::CartridgeSlot::default();
    }

    pub fn load_boot_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.mmu.load_boot_rom(bytes)
    }

    pub fn load_boot_rom_from_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let bytes = std::fs::read(path)?;
        self.load_boot_rom(&bytes)
    }

    pub fn is_game_rom_loaded(&self) -> bool {
        self.mmu.cartridge.is_loaded()
    }

    pub fn is_boot_rom_loaded(&self) -> bool {
        self.mmu.is_boot_rom_loaded()
    }

    pub fn is_boot_rom_mapped(&self) -> bool {
        self.mmu.is_boot_rom_mapped()
    }

    pub fn loaded_rom_title(&self) -> &str {
        self.mmu.cartridge.title()
    }

    // Host-shared surfaces

    pub fn frame_buffers(&self) -> Arc<FrameBuffers> {
        Arc::clone(&self.frames)
    }

    pub fn joypad(&self) -> Arc<JoypadState> {
        Arc::clone(&self.joypad_state)
    }

    pub fn controls(&self) -> Arc<SharedControls> {
        Arc::clone(&self.controls)
    }

    /// Battery-backed cartridge RAM, for the host to snapshot.
    pub fn battery_backed_ram(&self) -> Option<&[u8]> {
        self.mmu.cartridge.battery_backed_ram()
    }

    pub fn load_saved_ram(&mut self, saved: &[u8]) {
        self.mmu.cartridge.load_saved_ram(saved);
    }

    // Register file and debug memory access

    pub fn register_file(&self) -> RegisterFile {
        self.cpu.register_file()
    }

    pub fn set_register_file(&mut self, registers: RegisterFile) {
        self.cpu.set_register_file(registers);
    }

    /// Next opcode latched in the CPU's instruction register.
    pub fn instruction_register(&self) -> u8 {
        self.cpu.instruction_register()
    }

    /// Inspection read that bypasses the OAM-DMA bus-conflict redirect
    /// and consumes no machine cycle.
    pub fn read_byte(&self, address: u16) -> u8 {
        self.mmu.read_byte(address, AccessSource::OamDma)
    }

    /// Debug write; consumes no machine cycle.
    pub fn write_byte(&mut self, address: u16, value: u8) {
        self.mmu.write_byte(address, value, AccessSource::Cpu);
    }
}
