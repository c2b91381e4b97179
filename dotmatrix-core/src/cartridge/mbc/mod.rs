//! Memory bank controller register state.
//!
//! The slot owns the ROM and RAM images; each controller here is only
//! the handful of mapping registers the cartridge chip carries, so the
//! variants stay `Copy`-cheap and the dispatch is a plain enum match.

mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;

pub use mbc1::Mbc1;
pub use mbc2::{MBC2_RAM_SIZE, Mbc2};
pub use mbc3::{Mbc3, RealTimeClock};
pub use mbc5::Mbc5;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Clone)]
pub enum Mapper {
    /// 32 KiB ROM wired straight to the bus.
    None,
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mapper {
    pub fn read_byte(&self, address: u16, rom: &[u8], ram: &[u8]) -> u8 {
        match self {
            Mapper::None => match address {
                0x0000..0x8000 => rom[usize::from(address)],
                _ => 0xff,
            },
            Mapper::Mbc1(mbc) => mbc.read_byte(address, rom, ram),
            Mapper::Mbc2(mbc) => mbc.read_byte(address, rom, ram),
            Mapper::Mbc3(mbc) => mbc.read_byte(address, rom, ram),
            Mapper::Mbc5(mbc) => mbc.read_byte(address, rom, ram),
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8, ram: &mut [u8]) {
        match self {
            Mapper::None => {
                log::debug!("write of 0x{value:02x} to 0x{address:04x} in a ROM-only cartridge dropped");
            }
            Mapper::Mbc1(mbc) => mbc.write_byte(address, value, ram),
            Mapper::Mbc2(mbc) => mbc.write_byte(address, value, ram),
            Mapper::Mbc3(mbc) => mbc.write_byte(address, value, ram),
            Mapper::Mbc5(mbc) => mbc.write_byte(address, value, ram),
        }
    }
}
