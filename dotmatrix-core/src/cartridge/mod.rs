//! Cartridge slot: header validation and the banked ROM/RAM image.
//!
//! A load either yields a fully validated slot or an error that leaves
//! whatever was previously inserted untouched; the emulator swaps slots
//! only on success.

pub mod mbc;

use crate::error::LoadError;
use mbc::{MBC2_RAM_SIZE, Mapper};

const HEADER_END: usize = 0x0150;
const LOGO_START: usize = 0x0104;
const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0144;
const CGB_FLAG: usize = 0x0143;
const CARTRIDGE_TYPE: usize = 0x0147;
const ROM_SIZE_BYTE: usize = 0x0148;
const RAM_SIZE_BYTE: usize = 0x0149;
const HEADER_CHECKSUM_START: u16 = 0x0134;
const HEADER_CHECKSUM_END: u16 = 0x014c;

/// The bitmap the boot ROM draws; carts without it do not boot on real
/// hardware and are rejected here too.
const NINTENDO_LOGO: [u8; 48] = [
    0xce, 0xed, 0x66, 0x66, 0xcc, 0x0d, 0x00, 0x0b, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0c, 0x00,
    0x0d, 0x00, 0x08, 0x11, 0x1f, 0x88, 0x89, 0x00, 0x0e, 0xdc, 0xcc, 0x6e, 0xe6, 0xdd, 0xdd,
    0xd9, 0x99, 0xbb, 0xbb, 0x67, 0x63, 0x6e, 0x0e, 0xec, 0xcc, 0xdd, 0xdc, 0x99, 0x9f, 0xbb,
    0xb9, 0x33, 0x3e,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeKind {
    RomOnly,
    Mbc1,
    Mbc1Ram,
    Mbc1RamBattery,
    Mbc2,
    Mbc2Battery,
    Mbc3TimerBattery,
    Mbc3TimerRamBattery,
    Mbc3,
    Mbc3Ram,
    Mbc3RamBattery,
    Mbc5,
    Mbc5Ram,
    Mbc5RamBattery,
    Mbc5Rumble,
    Mbc5RumbleRam,
    Mbc5RumbleRamBattery,
}

impl CartridgeKind {
    pub fn has_battery(self) -> bool {
        use CartridgeKind::*;
        matches!(
            self,
            Mbc1RamBattery
                | Mbc2Battery
                | Mbc3TimerBattery
                | Mbc3TimerRamBattery
                | Mbc3RamBattery
                | Mbc5RamBattery
                | Mbc5RumbleRamBattery
        )
    }
}

impl TryFrom<u8> for CartridgeKind {
    type Error = u8;

    // https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::RomOnly),
            0x01 => Ok(Self::Mbc1),
            0x02 => Ok(Self::Mbc1Ram),
            0x03 => Ok(Self::Mbc1RamBattery),
            0x05 => Ok(Self::Mbc2),
            0x06 => Ok(Self::Mbc2Battery),
            0x0f => Ok(Self::Mbc3TimerBattery),
            0x10 => Ok(Self::Mbc3TimerRamBattery),
            0x11 => Ok(Self::Mbc3),
            0x12 => Ok(Self::Mbc3Ram),
            0x13 => Ok(Self::Mbc3RamBattery),
            0x19 => Ok(Self::Mbc5),
            0x1a => Ok(Self::Mbc5Ram),
            0x1b => Ok(Self::Mbc5RamBattery),
            0x1c => Ok(Self::Mbc5Rumble),
            0x1d => Ok(Self::Mbc5RumbleRam),
            0x1e => Ok(Self::Mbc5RumbleRamBattery),
            _ => Err(value),
        }
    }
}

pub struct CartridgeSlot {
    rom: Vec<u8>,
    ram: Vec<u8>,
    mapper: Mapper,
    kind: CartridgeKind,
    title: String,
}

impl Default for CartridgeSlot {
    /// An empty slot; the bus floats high.
    fn default() -> Self {
        Self {
            rom: Vec::new(),
            ram: Vec::new(),
            mapper: Mapper::None,
            kind: CartridgeKind::RomOnly,
            title: String::new(),
        }
    }
}

impl CartridgeSlot {
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_END {
            return Err(LoadError::TooSmallForHeader(bytes.len()));
        }
        if bytes[LOGO_START..LOGO_START + NINTENDO_LOGO.len()] != NINTENDO_LOGO {
            return Err(LoadError::LogoMismatch);
        }
        if bytes[CGB_FLAG] == 0xc0 {
            return Err(LoadError::CgbOnly);
        }

        let cartridge_type = bytes[CARTRIDGE_TYPE];
        let kind = CartridgeKind::try_from(cartridge_type)
            .map_err(LoadError::UnsupportedCartridgeType)?;

        let rom_size_byte = bytes[ROM_SIZE_BYTE];
        if rom_size_byte > 0x08 {
            return Err(LoadError::InvalidRomSize(rom_size_byte));
        }
        let expected_rom_len = 0x8000usize << rom_size_byte;
        if bytes.len() != expected_rom_len {
            return Err(LoadError::SizeMismatch {
                expected: expected_rom_len,
                actual: bytes.len(),
            });
        }

        let ram_size_byte = bytes[RAM_SIZE_BYTE];
        let ram_len = match ram_size_byte {
            0x00 => 0,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => return Err(LoadError::InvalidRamSize(ram_size_byte)),
        };

        use CartridgeKind::*;
        let ram_size_mismatch = match kind {
            // A plain 32 KiB cart has nothing to bank and no RAM.
            RomOnly => ram_len != 0 || expected_rom_len != 0x8000,
            // MBC2 RAM is inside the controller; the header must say none.
            Mbc2 | Mbc2Battery => ram_len != 0,
            Mbc1 | Mbc3 | Mbc3TimerBattery | Mbc5 | Mbc5Rumble => ram_len != 0,
            _ => false,
        };
        if ram_size_mismatch {
            return Err(LoadError::RamSizeMismatch { cartridge_type, ram_size_byte });
        }

        let ram = match kind {
            Mbc2 | Mbc2Battery => vec![0; MBC2_RAM_SIZE],
            _ => vec![0; ram_len],
        };
        let mapper = Self::mapper_for(kind, bytes.len(), ram.len());

        let title = bytes[TITLE_START..TITLE_END]
            .iter()
            .take_while(|byte| byte.is_ascii_graphic() || **byte == b' ')
            .map(|byte| *byte as char)
            .collect::<String>()
            .trim_end()
            .to_string();

        log::info!("loaded \"{title}\" ({kind:?}, {} KiB ROM, {} KiB RAM)", bytes.len() / 1024, ram.len() / 1024);
        Ok(Self { rom: bytes.to_vec(), ram, mapper, kind, title })
    }

    fn mapper_for(kind: CartridgeKind, rom_len: usize, ram_len: usize) -> Mapper {
        use CartridgeKind::*;
        match kind {
            RomOnly => Mapper::None,
            Mbc1 | Mbc1Ram | Mbc1RamBattery => Mapper::Mbc1(mbc::Mbc1::new(rom_len, ram_len)),
            Mbc2 | Mbc2Battery => Mapper::Mbc2(mbc::Mbc2::new(rom_len)),
            Mbc3 | Mbc3Ram | Mbc3RamBattery | Mbc3TimerBattery | Mbc3TimerRamBattery => {
                Mapper::Mbc3(mbc::Mbc3::new(rom_len, ram_len))
            }
            Mbc5 | Mbc5Ram | Mbc5RamBattery | Mbc5Rumble | Mbc5RumbleRam
            | Mbc5RumbleRamBattery => Mapper::Mbc5(mbc::Mbc5::new(rom_len, ram_len)),
        }
    }

    /// Drop the banking registers back to power-on without touching the
    /// inserted image.
    pub fn reset_state(&mut self) {
        self.mapper = Self::mapper_for(self.kind, self.rom.len(), self.ram.len());
    }

    pub fn is_loaded(&self) -> bool {
        !self.rom.is_empty()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> CartridgeKind {
        self.kind
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Battery-backed RAM for the host to persist, when the cartridge
    /// has a battery.
    pub fn battery_backed_ram(&self) -> Option<&[u8]> {
        self.kind.has_battery().then_some(self.ram.as_slice())
    }

    pub fn load_saved_ram(&mut self, saved: &[u8]) {
        let len = saved.len().min(self.ram.len());
        self.ram[..len].copy_from_slice(&saved[..len]);
    }

    /// Flags H and C after boot depend on this coming out non-zero.
    pub fn header_checksum_nonzero(&self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        let mut checksum = 0u8;
        for address in HEADER_CHECKSUM_START..=HEADER_CHECKSUM_END {
            checksum = checksum.wrapping_sub(self.rom[usize::from(address)]).wrapping_sub(1);
        }
        checksum != 0
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        if self.rom.is_empty() {
            return 0xff;
        }
        self.mapper.read_byte(address, &self.rom, &self.ram)
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        if self.rom.is_empty() {
            return;
        }
        self.mapper.write_byte(address, value, &mut self.ram);
    }
}
