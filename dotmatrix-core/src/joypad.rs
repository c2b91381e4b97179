//! P1/JOYP and the host-shared input state.
//!
//! The host (input thread) flips bits in two atomic masks; the core
//! reads them whenever the CPU touches 0xff00 and once per machine cycle
//! for the interrupt edge. Bit clear means pressed, matching the
//! active-low hardware matrix.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::mmu::Interrupts;

#[derive(Debug, Clone, Copy)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
}

#[derive(Debug, Clone, Copy)]
pub enum DirectionKey {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
}

/// Shared between the emulation worker and the host input thread.
#[derive(Debug)]
pub struct JoypadState {
    buttons: AtomicU8,
    direction_pad: AtomicU8,
}

impl Default for JoypadState {
    fn default() -> Self {
        Self {
            buttons: AtomicU8::new(0x0f),
            direction_pad: AtomicU8::new(0x0f),
        }
    }
}

impl JoypadState {
    pub fn set_button(&self, button: Button, pressed: bool) {
        Self::update(&self.buttons, 1 << button as u8, pressed);
    }

    pub fn set_direction(&self, direction: DirectionKey, pressed: bool) {
        Self::update(&self.direction_pad, 1 << direction as u8, pressed);
    }

    fn update(mask: &AtomicU8, bit: u8, pressed: bool) {
        if pressed {
            mask.fetch_and(!bit, Ordering::Release);
        } else {
            mask.fetch_or(bit, Ordering::Release);
        }
    }

    fn button_bits(&self) -> u8 {
        self.buttons.load(Ordering::Acquire)
    }

    fn direction_bits(&self) -> u8 {
        self.direction_pad.load(Ordering::Acquire)
    }
}

pub struct Joypad {
    state: std::sync::Arc<JoypadState>,
    /// P1 bits 5..4 as last written; 0 in a bit means that half of the
    /// matrix is selected.
    select_bits: u8,
    previously_visible_nibble: u8,
}

impl Joypad {
    pub fn new(state: std::sync::Arc<JoypadState>) -> Self {
        Self {
            state,
            select_bits: 0x30,
            previously_visible_nibble: 0x0f,
        }
    }

    pub fn reset_state(&mut self) {
        self.select_bits = 0x30;
        self.previously_visible_nibble = 0x0f;
    }

    pub fn set_post_boot_state(&mut self) {
        self.reset_state();
        self.select_bits = 0x00;
    }

    /// Only the selection bits are writable.
    pub fn write_register(&mut self, value: u8) {
        self.select_bits = value & 0x30;
    }

    /// Bits 7..6 always read 1. Selecting both halves ANDs them.
    pub fn read_register(&self) -> u8 {
        0b1100_0000 | self.select_bits | self.visible_nibble()
    }

    fn visible_nibble(&self) -> u8 {
        let mut nibble = 0x0f;
        if self.select_bits & 0x20 == 0 {
            nibble &= self.state.button_bits();
        }
        if self.select_bits & 0x10 == 0 {
            nibble &= self.state.direction_bits();
        }
        nibble
    }

    /// A high-to-low transition on any selected line requests the joypad
    /// interrupt. Polled once per machine cycle.
    #[must_use]
    pub fn detect_interrupt(&mut self) -> Interrupts {
        let visible = self.visible_nibble();
        let falling = self.previously_visible_nibble & !visible & 0x0f;
        self.previously_visible_nibble = visible;
        if falling != 0 {
            Interrupts::JOYPAD
        } else {
            Interrupts::empty()
        }
    }
}
