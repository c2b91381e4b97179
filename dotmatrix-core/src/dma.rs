//! OAM-DMA engine state.
//!
//! Writing 0xff46 arms a little startup machine so the 160-byte burst
//! only begins one machine cycle after the write. The copy itself is
//! driven by the MMU, which owns the memory paths; this type tracks the
//! source, the progress counter and the register readback value.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StartupState {
    #[default]
    NotStarting,
    RegisterWrittenTo,
    Starting,
}

pub const OAM_DMA_MACHINE_CYCLE_DURATION: u8 = 160;

#[derive(Debug, Clone, Default)]
pub struct OamDma {
    register: u8,
    startup_state: StartupState,
    source_base: u16,
    cycles_elapsed: u8,
    in_progress: bool,
}

impl OamDma {
    pub fn reset_state(&mut self) {
        *self = Self::default();
    }

    pub fn set_post_boot_state(&mut self) {
        self.reset_state();
        self.register = 0xff;
    }

    pub fn read_register(&self) -> u8 {
        self.register
    }

    pub fn write_register(&mut self, value: u8) {
        self.register = value;
        self.startup_state = StartupState::RegisterWrittenTo;
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn source_base(&self) -> u16 {
        self.source_base
    }

    pub fn cycles_elapsed(&self) -> u8 {
        self.cycles_elapsed
    }

    /// Address of the byte being transferred this machine cycle; also
    /// what a bus-conflicted CPU read observes.
    pub fn current_source_address(&self) -> u16 {
        self.source_base + u16::from(self.cycles_elapsed)
    }

    /// One byte has been copied by the MMU.
    pub fn advance_copy(&mut self) {
        self.cycles_elapsed += 1;
        if self.cycles_elapsed == OAM_DMA_MACHINE_CYCLE_DURATION {
            self.in_progress = false;
        }
    }

    pub fn advance_startup(&mut self) {
        match self.startup_state {
            StartupState::NotStarting => {}
            StartupState::RegisterWrittenTo => self.startup_state = StartupState::Starting,
            StartupState::Starting => {
                // Sources at or above 0xfe00 would point into OAM itself;
                // the hardware redirects them 0x2000 down.
                let source_page = if self.register >= 0xfe {
                    self.register - 0x20
                } else {
                    self.register
                };
                self.source_base = u16::from(source_page) << 8;
                self.cycles_elapsed = 0;
                self.in_progress = true;
                self.startup_state = StartupState::NotStarting;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OamDma;

    #[test]
    fn transfer_arms_one_machine_cycle_after_the_write() {
        let mut dma = OamDma::default();
        dma.write_register(0xc0);
        assert!(!dma.is_in_progress());
        dma.advance_startup();
        assert!(!dma.is_in_progress());
        dma.advance_startup();
        assert!(dma.is_in_progress());
        assert_eq!(0xc000, dma.source_base());
        assert_eq!(0, dma.cycles_elapsed());
    }

    #[test]
    fn copy_finishes_after_160_bytes() {
        let mut dma = OamDma::default();
        dma.write_register(0x12);
        dma.advance_startup();
        dma.advance_startup();
        for expected in 0..160u16 {
            assert!(dma.is_in_progress());
            assert_eq!(0x1200 + expected, dma.current_source_address());
            dma.advance_copy();
        }
        assert!(!dma.is_in_progress());
    }

    #[test]
    fn sources_pointing_into_oam_wrap_down() {
        let mut dma = OamDma::default();
        dma.write_register(0xfe);
        dma.advance_startup();
        dma.advance_startup();
        assert_eq!(0xde00, dma.source_base());

        dma.write_register(0xff);
        dma.advance_startup();
        dma.advance_startup();
        assert_eq!(0xdf00, dma.source_base());
    }

    #[test]
    fn rewriting_the_register_restarts_the_transfer() {
        let mut dma = OamDma::default();
        dma.write_register(0xc0);
        dma.advance_startup();
        dma.advance_startup();
        for _ in 0..10 {
            dma.advance_copy();
        }
        dma.write_register(0xd0);
        dma.advance_startup();
        dma.advance_startup();
        assert!(dma.is_in_progress());
        assert_eq!(0xd000, dma.source_base());
        assert_eq!(0, dma.cycles_elapsed());
    }
}
