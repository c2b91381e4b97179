//! DIV/TIMA/TMA/TAC.
//!
//! There is one 16-bit system counter advancing by 4 every M-cycle; DIV
//! is its upper byte. TIMA increments on the falling edge of one selected
//! counter bit ANDed with the TAC enable, which is what makes DIV writes
//! and TAC rewrites able to tick TIMA "for free".
//! https://gbdev.io/pandocs/Timer_Obscure_Behaviour.html

use crate::mmu::Interrupts;

/// system_counter bit watched per TAC clock select.
const SELECTED_BIT_BY_CLOCK_SELECT: [u8; 4] = [9, 3, 5, 7];

#[derive(Debug, Clone)]
pub struct Timer {
    system_counter: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    previously_selected_bit_set: bool,
    /// Set during the M-cycle the overflow happened; the interrupt and
    /// the TMA reload land one M-cycle later.
    tima_overflow_pending: bool,
    /// Set during the M-cycle the reload lands; TIMA/TMA writes behave
    /// differently in exactly that window.
    tima_overflow_handled: bool,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            system_counter: 0,
            tima: 0,
            tma: 0,
            tac: 0xf8,
            previously_selected_bit_set: false,
            tima_overflow_pending: false,
            tima_overflow_handled: false,
        }
    }
}

impl Timer {
    pub fn reset_state(&mut self) {
        *self = Self::default();
    }

    pub fn set_post_boot_state(&mut self) {
        self.reset_state();
        self.system_counter = 0xabc8;
    }

    #[must_use]
    pub fn step_single_machine_cycle(&mut self) -> Interrupts {
        self.system_counter = self.system_counter.wrapping_add(4);

        let mut requested = Interrupts::empty();
        if self.tima_overflow_pending {
            requested |= Interrupts::TIMER;
            self.tima = self.tma;
        }
        self.tima_overflow_handled = self.tima_overflow_pending;
        self.tima_overflow_pending = self.update_tima_and_get_overflow();
        requested
    }

    pub fn read_div(&self) -> u8 {
        (self.system_counter >> 8) as u8
    }

    pub fn read_tima(&self) -> u8 {
        self.tima
    }

    pub fn read_tma(&self) -> u8 {
        self.tma
    }

    pub fn read_tac(&self) -> u8 {
        0xf8 | self.tac
    }

    /// Writing any value resets the whole counter, which may synthesize a
    /// falling edge on the selected bit.
    #[must_use]
    pub fn write_div(&mut self) -> Interrupts {
        self.system_counter = 0;
        self.update_tima_early()
    }

    pub fn write_tima(&mut self, value: u8) {
        // Ignored in the reload cycle; TMA has already won.
        if self.tima_overflow_handled {
            return;
        }
        self.tima = value;
        self.tima_overflow_pending = false;
    }

    pub fn write_tma(&mut self, value: u8) {
        self.tma = value;
        if self.tima_overflow_handled {
            self.tima = self.tma;
        }
    }

    #[must_use]
    pub fn write_tac(&mut self, value: u8) -> Interrupts {
        self.tac = 0xf8 | value;
        self.update_tima_early()
    }

    /// Re-evaluate the falling-edge detector outside the normal per-cycle
    /// pathway; a register write that produced an edge increments TIMA
    /// immediately, and an overflow there also reloads immediately.
    fn update_tima_early(&mut self) -> Interrupts {
        if self.update_tima_and_get_overflow() {
            self.tima = self.tma;
            Interrupts::TIMER
        } else {
            Interrupts::empty()
        }
    }

    fn update_tima_and_get_overflow(&mut self) -> bool {
        let enabled = self.tac & 0b100 != 0;
        let selected_bit = SELECTED_BIT_BY_CLOCK_SELECT[usize::from(self.tac & 0b11)];
        let selected_bit_set = enabled && self.system_counter & (1 << selected_bit) != 0;

        let falling_edge = !selected_bit_set && self.previously_selected_bit_set;
        self.previously_selected_bit_set = selected_bit_set;

        if !falling_edge {
            return false;
        }
        self.tima = self.tima.wrapping_add(1);
        self.tima == 0
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;
    use crate::mmu::Interrupts;

    fn step(timer: &mut Timer) -> Interrupts {
        timer.step_single_machine_cycle()
    }

    #[test]
    fn div_is_the_upper_byte_of_the_system_counter() {
        let mut timer = Timer::default();
        for _ in 0..64 {
            assert!(step(&mut timer).is_empty());
        }
        assert_eq!(1, timer.read_div());
    }

    #[test]
    fn tima_ticks_every_sixteen_cycles_with_clock_select_one() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05); // enabled, bit 3 (every 16 T-cycles)
        for _ in 0..16 {
            let _ = step(&mut timer);
        }
        assert_eq!(4, timer.read_tima());
    }

    #[test]
    fn overflow_reloads_from_tma_one_cycle_late() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        timer.write_tma(0x80);
        timer.write_tima(0xff);
        // Bit 3 of the counter falls on the cycle after it was set, i.e.
        // counter 8 -> 12 keeps it set, 12 -> 16 clears it.
        let _ = step(&mut timer); // counter = 4
        let _ = step(&mut timer); // 8, bit set
        let _ = step(&mut timer); // 12
        let overflow_cycle = step(&mut timer); // 16: falling edge, TIMA wraps
        assert!(overflow_cycle.is_empty());
        assert_eq!(0x00, timer.read_tima());
        let reload_cycle = step(&mut timer);
        assert!(reload_cycle.contains(Interrupts::TIMER));
        assert_eq!(0x80, timer.read_tima());
    }

    #[test]
    fn disabling_the_timer_synthesizes_a_falling_edge() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        timer.write_tma(0x42);
        // Run until bit 3 is set, then load TIMA with 0xff.
        let _ = step(&mut timer);
        let _ = step(&mut timer); // counter = 8, bit 3 high
        timer.write_tima(0xff);
        let requested = timer.write_tac(0x00); // disable: selected bit drops
        assert!(requested.contains(Interrupts::TIMER));
        assert_eq!(0x42, timer.read_tima());
    }

    #[test]
    fn div_write_resets_counter_and_may_tick_tima() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        let _ = step(&mut timer);
        let _ = step(&mut timer); // bit 3 high
        let requested = timer.write_div();
        assert!(requested.is_empty());
        assert_eq!(0, timer.read_div());
        assert_eq!(1, timer.read_tima()); // the reset itself was an edge
    }

    #[test]
    fn tima_write_in_the_reload_cycle_is_ignored() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        timer.write_tma(0x80);
        timer.write_tima(0xff);
        for _ in 0..4 {
            let _ = step(&mut timer);
        }
        let _ = step(&mut timer); // reload cycle: TIMA = 0x80
        timer.write_tima(0x13); // ignored in this window
        assert_eq!(0x80, timer.read_tima());
    }

    #[test]
    fn tma_write_in_the_reload_cycle_propagates_to_tima() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        timer.write_tma(0x80);
        timer.write_tima(0xff);
        for _ in 0..4 {
            let _ = step(&mut timer);
        }
        let _ = step(&mut timer); // reload cycle
        timer.write_tma(0x9c);
        assert_eq!(0x9c, timer.read_tima());
    }

    #[test]
    fn tac_reads_or_the_upper_bits() {
        let mut timer = Timer::default();
        let _ = timer.write_tac(0x05);
        assert_eq!(0xfd, timer.read_tac());
    }
}
