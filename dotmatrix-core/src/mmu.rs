//! Bus fabric.
//!
//! Owns every addressable component and implements the CPU's [`Bus`]
//! trait: each access first advances timer, PPU and OAM-DMA by one
//! machine cycle, then dispatches. While a DMA burst is running, CPU
//! reads of anything sharing a bus with the DMA source observe the byte
//! being transferred instead.

use std::sync::Arc;

use crate::cartridge::CartridgeSlot;
use crate::cpu::Bus;
use crate::dma::OamDma;
use crate::error::LoadError;
use crate::frame::FrameBuffers;
use crate::joypad::{Joypad, JoypadState};
use crate::ppu::Ppu;
use crate::timer::Timer;

pub const VIDEO_RAM: u16 = 0x8000;
pub const EXTERNAL_RAM: u16 = 0xa000;
pub const WORK_RAM: u16 = 0xc000;
pub const ECHO_RAM: u16 = 0xe000;
pub const OAM: u16 = 0xfe00;
pub const NOT_USABLE: u16 = 0xfea0;
pub const JOYPAD: u16 = 0xff00;
pub const SERIAL_DATA: u16 = 0xff01; // SB
pub const SERIAL_CONTROL: u16 = 0xff02; // SC
pub const DIV: u16 = 0xff04;
pub const TIMA: u16 = 0xff05;
pub const TMA: u16 = 0xff06;
pub const TAC: u16 = 0xff07;
pub const INTERRUPT_FLAG: u16 = 0xff0f;
pub const LCD_CONTROL: u16 = 0xff40;
pub const LCD_STATUS: u16 = 0xff41;
pub const SCY: u16 = 0xff42;
pub const SCX: u16 = 0xff43;
pub const LY: u16 = 0xff44;
pub const LYC: u16 = 0xff45;
pub const DMA_TRANSFER: u16 = 0xff46;
pub const BGP: u16 = 0xff47;
pub const OBP0: u16 = 0xff48;
pub const OBP1: u16 = 0xff49;
pub const WY: u16 = 0xff4a;
pub const WX: u16 = 0xff4b;
pub const BOOT: u16 = 0xff50;
pub const HIGH_RAM: u16 = 0xff80;
pub const INTERRUPT_ENABLE: u16 = 0xffff;

pub const BOOT_ROM_SIZE: usize = 0x100;
const WORK_RAM_SIZE: usize = 0x2000;
const HIGH_RAM_SIZE: usize = 0x7f;
const IO_REGISTERS_SIZE: usize = 0x80;

bitflags::bitflags! {
    /// IF/IE bits, in priority order (lowest bit services first).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Interrupts: u8 {
        const VBLANK = 1;
        const LCD_STAT = 1 << 1;
        const TIMER = 1 << 2;
        const SERIAL = 1 << 3;
        const JOYPAD = 1 << 4;
    }
}

/// Who is performing a memory access. OAM-DMA's own traffic is exempt
/// from the bus-conflict redirect and from OAM locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSource {
    Cpu,
    OamDma,
}

/// ROM low/high, VRAM, external RAM, WRAM and echo are distinct buses; a
/// DMA transfer only collides with CPU accesses on its own bus. HRAM and
/// I/O live on neither.
fn are_addresses_on_same_bus(first_address: u16, second_address: u16) -> bool {
    const MEMORY_BUSES: [(u16, u16); 6] = [
        (0x0000, 0x4000),
        (0x4000, 0x4000),
        (VIDEO_RAM, 0x2000),
        (EXTERNAL_RAM, 0x2000),
        (WORK_RAM, 0x2000),
        (ECHO_RAM, 0x1e00),
    ];
    MEMORY_BUSES.iter().any(|(start, size)| {
        let in_range = |address: u16| address >= *start && address < start + size;
        in_range(first_address) && in_range(second_address)
    })
}

pub struct Mmu {
    pub cartridge: CartridgeSlot,
    pub timer: Timer,
    pub ppu: Ppu,
    pub joypad: Joypad,
    pub dma: OamDma,
    boot_rom: Box<[u8; BOOT_ROM_SIZE]>,
    boot_rom_loaded: bool,
    boot_rom_status: u8,
    work_ram: Box<[u8; WORK_RAM_SIZE]>,
    high_ram: [u8; HIGH_RAM_SIZE],
    /// APU stubs and unassigned I/O behave like RAM: reads return the
    /// last written value.
    unmapped_io: [u8; IO_REGISTERS_SIZE],
    interrupt_flag: u8,
    interrupt_enable: u8,
}

impl Mmu {
    pub fn new(joypad_state: Arc<JoypadState>, frames: Arc<FrameBuffers>) -> Self {
        Self {
            cartridge: CartridgeSlot::default(),
            timer: Timer::default(),
            ppu: Ppu::new(frames),
            joypad: Joypad::new(joypad_state),
            dma: OamDma::default(),
            boot_rom: Box::new([0; BOOT_ROM_SIZE]),
            boot_rom_loaded: false,
            boot_rom_status: 0,
            work_ram: Box::new([0; WORK_RAM_SIZE]),
            high_ram: [0; HIGH_RAM_SIZE],
            unmapped_io: [0; IO_REGISTERS_SIZE],
            interrupt_flag: 0xe0,
            interrupt_enable: 0,
        }
    }

    /// Resets everything the MMU itself owns; timer, PPU and cartridge
    /// registers are reset by the emulator in its documented order.
    pub fn reset_state(&mut self) {
        self.work_ram.fill(0);
        self.high_ram.fill(0);
        self.unmapped_io.fill(0);
        self.interrupt_flag = 0xe0;
        self.interrupt_enable = 0;
        self.boot_rom_status = 0;
        self.dma.reset_state();
        self.joypad.reset_state();
    }

    pub fn set_post_boot_state(&mut self) {
        self.work_ram.fill(0);
        self.high_ram.fill(0);
        self.unmapped_io.fill(0);
        self.boot_rom_status = 0x01;
        self.joypad.set_post_boot_state();
        self.interrupt_flag = 0xe1;
        self.interrupt_enable = 0;
        self.dma.set_post_boot_state();

        // I/O block as the DMG boot ROM leaves it; the APU stubs keep
        // these values until software rewrites them.
        for (address, value) in [
            (SERIAL_DATA, 0x00),
            (SERIAL_CONTROL, 0x7e),
            (0xff10, 0x80),
            (0xff11, 0xbf),
            (0xff12, 0xf3),
            (0xff13, 0xff),
            (0xff14, 0xbf),
            (0xff16, 0x3f),
            (0xff17, 0x00),
            (0xff18, 0xff),
            (0xff19, 0xbf),
            (0xff1a, 0x7f),
            (0xff1b, 0xff),
            (0xff1c, 0x9f),
            (0xff1d, 0xff),
            (0xff1e, 0xbf),
            (0xff20, 0xff),
            (0xff21, 0x00),
            (0xff22, 0x00),
            (0xff23, 0xbf),
            (0xff24, 0x77),
            (0xff25, 0xf3),
            (0xff26, 0xf1),
        ] {
            self.unmapped_io[usize::from(address - JOYPAD)] = value;
        }
    }

    pub fn load_boot_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.len() != BOOT_ROM_SIZE {
            return Err(LoadError::BootRomSize(bytes.len()));
        }
        self.boot_rom.copy_from_slice(bytes);
        self.boot_rom_loaded = true;
        Ok(())
    }

    pub fn is_boot_rom_loaded(&self) -> bool {
        self.boot_rom_loaded
    }

    pub fn is_boot_rom_mapped(&self) -> bool {
        self.boot_rom_loaded && self.boot_rom_status == 0
    }

    pub fn request_interrupts(&mut self, interrupts: Interrupts) {
        self.interrupt_flag |= interrupts.bits();
    }

    pub fn interrupt_flag(&self) -> u8 {
        self.interrupt_flag | 0xe0
    }

    /// One machine cycle for everything that is not the CPU, in the
    /// fixed order timer, PPU, OAM-DMA, joypad edge.
    pub fn step_single_machine_cycle(&mut self) {
        let timer_interrupts = self.timer.step_single_machine_cycle();
        self.request_interrupts(timer_interrupts);

        let ppu_interrupts = self.ppu.step_single_machine_cycle(self.dma.is_in_progress());
        self.request_interrupts(ppu_interrupts);

        self.step_oam_dma();

        let joypad_interrupts = self.joypad.detect_interrupt();
        self.request_interrupts(joypad_interrupts);
    }

    fn step_oam_dma(&mut self) {
        if self.dma.is_in_progress() {
            let byte = self.read_byte(self.dma.current_source_address(), AccessSource::OamDma);
            let destination = OAM + u16::from(self.dma.cycles_elapsed());
            self.ppu.write_oam(destination, byte, true, true);
            self.dma.advance_copy();
        }
        self.dma.advance_startup();
    }

    pub fn read_byte(&self, address: u16, source: AccessSource) -> u8 {
        let mut address = address;
        if self.dma.is_in_progress()
            && source == AccessSource::Cpu
            && are_addresses_on_same_bus(address, self.dma.source_base())
        {
            address = self.dma.current_source_address();
        }

        match address {
            0x0000..0x0100 if self.is_boot_rom_mapped() => self.boot_rom[usize::from(address)],
            0x0000..VIDEO_RAM => self.cartridge.read_byte(address),
            VIDEO_RAM..EXTERNAL_RAM => self.ppu.read_vram(address),
            EXTERNAL_RAM..WORK_RAM => self.cartridge.read_byte(address),
            WORK_RAM..ECHO_RAM => self.work_ram[usize::from(address - WORK_RAM)],
            ECHO_RAM..OAM => self.work_ram[usize::from(address - ECHO_RAM)],
            OAM..NOT_USABLE => self.ppu.read_oam(address, self.dma.is_in_progress()),
            NOT_USABLE..JOYPAD => 0x00,
            JOYPAD => self.joypad.read_register(),
            DIV => self.timer.read_div(),
            TIMA => self.timer.read_tima(),
            TMA => self.timer.read_tma(),
            TAC => self.timer.read_tac(),
            INTERRUPT_FLAG => self.interrupt_flag | 0xe0,
            LCD_CONTROL => self.ppu.read_lcd_control(),
            LCD_STATUS => self.ppu.read_stat(),
            SCY => self.ppu.scy,
            SCX => self.ppu.scx,
            LY => self.ppu.read_ly(),
            LYC => self.ppu.lyc,
            DMA_TRANSFER => self.dma.read_register(),
            BGP => self.ppu.bgp,
            OBP0 => self.ppu.obp0,
            OBP1 => self.ppu.obp1,
            WY => self.ppu.wy,
            WX => self.ppu.wx,
            BOOT => self.boot_rom_status,
            JOYPAD..HIGH_RAM => self.unmapped_io[usize::from(address - JOYPAD)],
            HIGH_RAM..INTERRUPT_ENABLE => self.high_ram[usize::from(address - HIGH_RAM)],
            INTERRUPT_ENABLE => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8, source: AccessSource) {
        match address {
            0x0000..VIDEO_RAM => self.cartridge.write_byte(address, value),
            VIDEO_RAM..EXTERNAL_RAM => self.ppu.write_vram(address, value),
            EXTERNAL_RAM..WORK_RAM => self.cartridge.write_byte(address, value),
            WORK_RAM..ECHO_RAM => self.work_ram[usize::from(address - WORK_RAM)] = value,
            ECHO_RAM..OAM => self.work_ram[usize::from(address - ECHO_RAM)] = value,
            OAM..NOT_USABLE => self.ppu.write_oam(
                address,
                value,
                self.dma.is_in_progress(),
                source == AccessSource::OamDma,
            ),
            NOT_USABLE..JOYPAD => {
                log::warn!("write of 0x{value:02x} to unusable address 0x{address:04x} dropped");
            }
            JOYPAD => self.joypad.write_register(value),
            SERIAL_DATA => {
                log::debug!("serial data byte 0x{value:02x}");
                self.unmapped_io[usize::from(address - JOYPAD)] = value;
            }
            DIV => {
                let requested = self.timer.write_div();
                self.request_interrupts(requested);
            }
            TIMA => self.timer.write_tima(value),
            TMA => self.timer.write_tma(value),
            TAC => {
                let requested = self.timer.write_tac(value);
                self.request_interrupts(requested);
            }
            INTERRUPT_FLAG => self.interrupt_flag = value | 0xe0,
            LCD_CONTROL => self.ppu.write_lcd_control(value),
            LCD_STATUS => self.ppu.write_stat(value),
            SCY => self.ppu.scy = value,
            SCX => self.ppu.scx = value,
            LY => log::warn!("write to read-only LY dropped"),
            LYC => self.ppu.lyc = value,
            DMA_TRANSFER => self.dma.write_register(value),
            BGP => self.ppu.bgp = value,
            OBP0 => self.ppu.obp0 = value,
            OBP1 => self.ppu.obp1 = value,
            WY => self.ppu.wy = value,
            WX => self.ppu.wx = value,
            BOOT => {
                if value & 1 != 0 && self.boot_rom_status == 0 {
                    log::debug!("boot ROM unmapped");
                }
                // One-way latch; the overlay never comes back.
                self.boot_rom_status |= value & 1;
            }
            JOYPAD..HIGH_RAM => self.unmapped_io[usize::from(address - JOYPAD)] = value,
            HIGH_RAM..INTERRUPT_ENABLE => {
                self.high_ram[usize::from(address - HIGH_RAM)] = value
            }
            INTERRUPT_ENABLE => self.interrupt_enable = value,
        }
    }
}

impl Bus for Mmu {
    fn read_cycle(&mut self, address: u16) -> u8 {
        self.step_single_machine_cycle();
        self.read_byte(address, AccessSource::Cpu)
    }

    fn write_cycle(&mut self, address: u16, value: u8) {
        self.step_single_machine_cycle();
        self.write_byte(address, value, AccessSource::Cpu);
    }

    fn internal_cycle(&mut self) {
        self.step_single_machine_cycle();
    }

    fn highest_priority_pending_interrupt(&self) -> u8 {
        let pending = self.interrupt_flag & self.interrupt_enable & 0x1f;
        if pending == 0 { 0 } else { 1 << pending.trailing_zeros() }
    }

    fn acknowledge_interrupt(&mut self, mask: u8) {
        self.interrupt_flag &= !mask;
    }
}
