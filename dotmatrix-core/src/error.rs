use thiserror::Error;

/// Why a ROM or boot ROM image was rejected. A failed load leaves the
/// emulator exactly as it was.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("file of {actual} bytes does not match the {expected} bytes implied by its header")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("file of {0} bytes is too small to hold a cartridge header")]
    TooSmallForHeader(usize),
    #[error("logo in the provided ROM does not match the expected pattern")]
    LogoMismatch,
    #[error("provided ROM requires Game Boy Color functionality to run")]
    CgbOnly,
    #[error("cartridge type 0x{0:02x} is not supported")]
    UnsupportedCartridgeType(u8),
    #[error("invalid ROM size byte 0x{0:02x}")]
    InvalidRomSize(u8),
    #[error("invalid RAM size byte 0x{0:02x}")]
    InvalidRamSize(u8),
    #[error("RAM size byte 0x{ram_size_byte:02x} is not valid for cartridge type 0x{cartridge_type:02x}")]
    RamSizeMismatch { cartridge_type: u8, ram_size_byte: u8 },
    #[error("boot ROM must be exactly 256 bytes, got {0}")]
    BootRomSize(usize),
}

/// Fatal execution faults. Real hardware locks up on these; the core
/// stops and surfaces the diagnostic instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unused opcode 0x{opcode:02x} executed at 0x{pc:04x}; the CPU is locked")]
    UnusedOpcode { opcode: u8, pc: u16 },
}
