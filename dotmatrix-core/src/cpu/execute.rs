//! Instruction decode and the micro-operations it is factored over.
//!
//! Both tables are one exhaustive `match` on the instruction register.
//! Cycle placement lives in the helpers: anything that touches memory or
//! burns an internal cycle says so explicitly, so the per-M-cycle traces
//! fall out of the decode structure rather than a side table.

use crate::cpu::{Bus, Cpu, Flags};
use crate::error::Fault;

const IO_REGISTERS_START: u16 = 0xff00;

fn half_carry_add(a: u8, b: u8) -> bool {
    (a & 0x0f) + (b & 0x0f) > 0x0f
}

fn half_carry_sub(a: u8, b: u8) -> bool {
    (a & 0x0f) < (b & 0x0f)
}

impl Cpu {
    /// B, C, D, E, H, L, -, A per the low three opcode bits. Index 6 is
    /// (HL) and never reaches these accessors; the decode routes it to a
    /// memory cycle first.
    fn register_by_index(&self, index: u8) -> u8 {
        match index {
            0 => self.registers.b,
            1 => self.registers.c,
            2 => self.registers.d,
            3 => self.registers.e,
            4 => self.registers.h,
            5 => self.registers.l,
            7 => self.registers.a,
            _ => unreachable!("(HL) is handled before register indexing"),
        }
    }

    fn set_register_by_index(&mut self, index: u8, value: u8) {
        match index {
            0 => self.registers.b = value,
            1 => self.registers.c = value,
            2 => self.registers.d = value,
            3 => self.registers.e = value,
            4 => self.registers.h = value,
            5 => self.registers.l = value,
            7 => self.registers.a = value,
            _ => unreachable!("(HL) is handled before register indexing"),
        }
    }

    fn fetch_immediate16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let low = self.fetch_immediate8(bus);
        let high = self.fetch_immediate8(bus);
        u16::from_be_bytes([high, low])
    }

    pub(super) fn execute_unprefixed<B: Bus>(&mut self, bus: &mut B) -> Result<(), Fault> {
        let opcode = self.instruction_register;
        match opcode {
            // NOP
            0x00 => {}
            // STOP - unused until the Game Boy Color's speed switch
            0x10 => {}

            // LD rr, d16
            0x01 => {
                let value = self.fetch_immediate16(bus);
                self.registers.set_bc(value);
            }
            0x11 => {
                let value = self.fetch_immediate16(bus);
                self.registers.set_de(value);
            }
            0x21 => {
                let value = self.fetch_immediate16(bus);
                self.registers.set_hl(value);
            }
            0x31 => self.registers.sp = self.fetch_immediate16(bus),

            // LD (rr), A and LD A, (rr), with HL post-increment/decrement
            0x02 => bus.write_cycle(self.registers.bc(), self.registers.a),
            0x12 => bus.write_cycle(self.registers.de(), self.registers.a),
            0x22 => {
                let hl = self.registers.hl();
                bus.write_cycle(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            0x32 => {
                let hl = self.registers.hl();
                bus.write_cycle(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_sub(1));
            }
            0x0a => self.registers.a = bus.read_cycle(self.registers.bc()),
            0x1a => self.registers.a = bus.read_cycle(self.registers.de()),
            0x2a => {
                let hl = self.registers.hl();
                self.registers.a = bus.read_cycle(hl);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            0x3a => {
                let hl = self.registers.hl();
                self.registers.a = bus.read_cycle(hl);
                self.registers.set_hl(hl.wrapping_sub(1));
            }

            // INC rr / DEC rr - the 16-bit unit costs an extra cycle
            0x03 => {
                self.registers.set_bc(self.registers.bc().wrapping_add(1));
                bus.internal_cycle();
            }
            0x13 => {
                self.registers.set_de(self.registers.de().wrapping_add(1));
                bus.internal_cycle();
            }
            0x23 => {
                self.registers.set_hl(self.registers.hl().wrapping_add(1));
                bus.internal_cycle();
            }
            0x33 => {
                self.registers.sp = self.registers.sp.wrapping_add(1);
                bus.internal_cycle();
            }
            0x0b => {
                self.registers.set_bc(self.registers.bc().wrapping_sub(1));
                bus.internal_cycle();
            }
            0x1b => {
                self.registers.set_de(self.registers.de().wrapping_sub(1));
                bus.internal_cycle();
            }
            0x2b => {
                self.registers.set_hl(self.registers.hl().wrapping_sub(1));
                bus.internal_cycle();
            }
            0x3b => {
                self.registers.sp = self.registers.sp.wrapping_sub(1);
                bus.internal_cycle();
            }

            // ADD HL, rr
            0x09 => self.add_hl(bus, self.registers.bc()),
            0x19 => self.add_hl(bus, self.registers.de()),
            0x29 => self.add_hl(bus, self.registers.hl()),
            0x39 => self.add_hl(bus, self.registers.sp),

            // INC/DEC (HL) read, modify, write back
            0x34 => {
                let hl = self.registers.hl();
                let value = bus.read_cycle(hl);
                let incremented = self.increment(value);
                bus.write_cycle(hl, incremented);
            }
            0x35 => {
                let hl = self.registers.hl();
                let value = bus.read_cycle(hl);
                let decremented = self.decrement(value);
                bus.write_cycle(hl, decremented);
            }
            0x36 => {
                let value = self.fetch_immediate8(bus);
                bus.write_cycle(self.registers.hl(), value);
            }

            // INC r / DEC r / LD r, d8
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x3c => {
                let index = (opcode >> 3) & 0b111;
                let incremented = self.increment(self.register_by_index(index));
                self.set_register_by_index(index, incremented);
            }
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x3d => {
                let index = (opcode >> 3) & 0b111;
                let decremented = self.decrement(self.register_by_index(index));
                self.set_register_by_index(index, decremented);
            }
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x3e => {
                let value = self.fetch_immediate8(bus);
                self.set_register_by_index((opcode >> 3) & 0b111, value);
            }

            // Accumulator rotates clear Z, unlike their prefixed twins
            0x07 => {
                let carry = self.registers.a >> 7;
                self.registers.a = self.registers.a.rotate_left(1);
                self.registers.f = Flags::empty();
                self.registers.f.set(Flags::CARRY, carry == 1);
            }
            0x0f => {
                let carry = self.registers.a & 1;
                self.registers.a = self.registers.a.rotate_right(1);
                self.registers.f = Flags::empty();
                self.registers.f.set(Flags::CARRY, carry == 1);
            }
            0x17 => {
                let old_carry = self.registers.f.contains(Flags::CARRY) as u8;
                let new_carry = self.registers.a & 0x80 != 0;
                self.registers.a = (self.registers.a << 1) | old_carry;
                self.registers.f = Flags::empty();
                self.registers.f.set(Flags::CARRY, new_carry);
            }
            0x1f => {
                let old_carry = self.registers.f.contains(Flags::CARRY) as u8;
                let new_carry = self.registers.a & 1 != 0;
                self.registers.a = (self.registers.a >> 1) | (old_carry << 7);
                self.registers.f = Flags::empty();
                self.registers.f.set(Flags::CARRY, new_carry);
            }

            // LD (a16), SP
            0x08 => {
                let address = self.fetch_immediate16(bus);
                let [sp_high, sp_low] = self.registers.sp.to_be_bytes();
                bus.write_cycle(address, sp_low);
                bus.write_cycle(address.wrapping_add(1), sp_high);
            }

            // JR
            0x18 => self.jump_relative_conditional(bus, true),
            0x20 => self.jump_relative_conditional(bus, !self.registers.f.contains(Flags::ZERO)),
            0x28 => self.jump_relative_conditional(bus, self.registers.f.contains(Flags::ZERO)),
            0x30 => self.jump_relative_conditional(bus, !self.registers.f.contains(Flags::CARRY)),
            0x38 => self.jump_relative_conditional(bus, self.registers.f.contains(Flags::CARRY)),

            0x27 => self.decimal_adjust_a(),
            0x2f => {
                self.registers.a = !self.registers.a;
                self.registers.f.insert(Flags::SUBTRACT | Flags::HALF_CARRY);
            }
            0x37 => {
                self.registers.f.remove(Flags::SUBTRACT | Flags::HALF_CARRY);
                self.registers.f.insert(Flags::CARRY);
            }
            0x3f => {
                self.registers.f.remove(Flags::SUBTRACT | Flags::HALF_CARRY);
                self.registers.f.toggle(Flags::CARRY);
            }

            0x76 => self.halt(bus),

            // LD r, r / LD r, (HL) / LD (HL), r
            0x46 | 0x4e | 0x56 | 0x5e | 0x66 | 0x6e | 0x7e => {
                let value = bus.read_cycle(self.registers.hl());
                self.set_register_by_index((opcode >> 3) & 0b111, value);
            }
            0x70..=0x77 => {
                bus.write_cycle(self.registers.hl(), self.register_by_index(opcode & 0b111));
            }
            0x40..=0x7f => {
                let value = self.register_by_index(opcode & 0b111);
                self.set_register_by_index((opcode >> 3) & 0b111, value);
            }

            // The eight-operation ALU block
            0x80..=0xbf => {
                let value = if opcode & 0b111 == 6 {
                    bus.read_cycle(self.registers.hl())
                } else {
                    self.register_by_index(opcode & 0b111)
                };
                self.accumulator_operation((opcode >> 3) & 0b111, value);
            }

            // RET cc / RET / RETI
            0xc0 => self.return_conditional(bus, !self.registers.f.contains(Flags::ZERO)),
            0xc8 => self.return_conditional(bus, self.registers.f.contains(Flags::ZERO)),
            0xd0 => self.return_conditional(bus, !self.registers.f.contains(Flags::CARRY)),
            0xd8 => self.return_conditional(bus, self.registers.f.contains(Flags::CARRY)),
            0xc9 => {
                let address = self.pop_word(bus);
                bus.internal_cycle();
                self.registers.pc = address;
            }
            0xd9 => {
                let address = self.pop_word(bus);
                bus.internal_cycle();
                self.registers.pc = address;
                self.enable_interrupts_immediately();
            }

            // POP rr / PUSH rr
            0xc1 => {
                let value = self.pop_word(bus);
                self.registers.set_bc(value);
            }
            0xd1 => {
                let value = self.pop_word(bus);
                self.registers.set_de(value);
            }
            0xe1 => {
                let value = self.pop_word(bus);
                self.registers.set_hl(value);
            }
            0xf1 => {
                let value = self.pop_word(bus);
                self.registers.set_af(value);
            }
            0xc5 => self.push_word(bus, self.registers.bc()),
            0xd5 => self.push_word(bus, self.registers.de()),
            0xe5 => self.push_word(bus, self.registers.hl()),
            0xf5 => self.push_word(bus, self.registers.af()),

            // JP cc / JP
            0xc2 => self.jump_conditional(bus, !self.registers.f.contains(Flags::ZERO)),
            0xca => self.jump_conditional(bus, self.registers.f.contains(Flags::ZERO)),
            0xd2 => self.jump_conditional(bus, !self.registers.f.contains(Flags::CARRY)),
            0xda => self.jump_conditional(bus, self.registers.f.contains(Flags::CARRY)),
            0xc3 => self.jump_conditional(bus, true),
            0xe9 => self.registers.pc = self.registers.hl(),

            // CALL cc / CALL
            0xc4 => self.call_conditional(bus, !self.registers.f.contains(Flags::ZERO)),
            0xcc => self.call_conditional(bus, self.registers.f.contains(Flags::ZERO)),
            0xd4 => self.call_conditional(bus, !self.registers.f.contains(Flags::CARRY)),
            0xdc => self.call_conditional(bus, self.registers.f.contains(Flags::CARRY)),
            0xcd => self.call_conditional(bus, true),

            // RST
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.push_word(bus, self.registers.pc);
                self.registers.pc = u16::from(opcode & 0b0011_1000);
            }

            // ALU with an immediate operand
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let value = self.fetch_immediate8(bus);
                self.accumulator_operation((opcode >> 3) & 0b111, value);
            }

            // High-RAM loads
            0xe0 => {
                let offset = self.fetch_immediate8(bus);
                bus.write_cycle(IO_REGISTERS_START + u16::from(offset), self.registers.a);
            }
            0xf0 => {
                let offset = self.fetch_immediate8(bus);
                self.registers.a = bus.read_cycle(IO_REGISTERS_START + u16::from(offset));
            }
            0xe2 => {
                bus.write_cycle(IO_REGISTERS_START + u16::from(self.registers.c), self.registers.a)
            }
            0xf2 => {
                self.registers.a = bus.read_cycle(IO_REGISTERS_START + u16::from(self.registers.c))
            }
            0xea => {
                let address = self.fetch_immediate16(bus);
                bus.write_cycle(address, self.registers.a);
            }
            0xfa => {
                let address = self.fetch_immediate16(bus);
                self.registers.a = bus.read_cycle(address);
            }

            // Stack-pointer arithmetic; both carries come from the low byte
            0xe8 => {
                let offset = self.fetch_immediate8(bus);
                let adjusted = self.adjusted_stack_pointer(offset);
                bus.internal_cycle();
                bus.internal_cycle();
                self.registers.sp = adjusted;
            }
            0xf8 => {
                let offset = self.fetch_immediate8(bus);
                let adjusted = self.adjusted_stack_pointer(offset);
                bus.internal_cycle();
                self.registers.set_hl(adjusted);
            }
            0xf9 => {
                self.registers.sp = self.registers.hl();
                bus.internal_cycle();
            }

            0xf3 => self.disable_interrupts(),
            0xfb => self.enable_interrupts_delayed(),

            // The fetch consumes 0xcb as a prefix; it never lands in IR
            // as an unprefixed instruction.
            0xcb => unreachable!("prefix byte latched as an instruction"),

            0xd3 | 0xdb | 0xdd | 0xe3 | 0xe4 | 0xeb | 0xec | 0xed | 0xf4 | 0xfc | 0xfd => {
                return Err(Fault::UnusedOpcode {
                    opcode,
                    pc: self.registers.pc.wrapping_sub(1),
                });
            }
        }
        Ok(())
    }

    pub(super) fn execute_prefixed<B: Bus>(&mut self, bus: &mut B) {
        let opcode = self.instruction_register;
        let register_index = opcode & 0b111;
        // Selects the shift operation below 0x40, the bit position above.
        let selector = (opcode >> 3) & 0b111;

        match opcode {
            // Shift/rotate/swap group on (HL)
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let hl = self.registers.hl();
                let value = bus.read_cycle(hl);
                let result = self.shift_operation(selector, value);
                bus.write_cycle(hl, result);
            }
            0x00..=0x3f => {
                let result = self.shift_operation(selector, self.register_by_index(register_index));
                self.set_register_by_index(register_index, result);
            }

            // BIT reads only; the (HL) variant costs a single extra cycle
            0x46 | 0x4e | 0x56 | 0x5e | 0x66 | 0x6e | 0x76 | 0x7e => {
                let value = bus.read_cycle(self.registers.hl());
                self.test_bit(selector, value);
            }
            0x40..=0x7f => self.test_bit(selector, self.register_by_index(register_index)),

            // RES / SET on (HL) read-modify-write
            0x86 | 0x8e | 0x96 | 0x9e | 0xa6 | 0xae | 0xb6 | 0xbe => {
                let hl = self.registers.hl();
                let value = bus.read_cycle(hl);
                bus.write_cycle(hl, value & !(1 << selector));
            }
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let hl = self.registers.hl();
                let value = bus.read_cycle(hl);
                bus.write_cycle(hl, value | (1 << selector));
            }
            0x80..=0xbf => {
                let value = self.register_by_index(register_index) & !(1 << selector);
                self.set_register_by_index(register_index, value);
            }
            0xc0..=0xff => {
                let value = self.register_by_index(register_index) | (1 << selector);
                self.set_register_by_index(register_index, value);
            }
        }
    }

    // Generic instructions

    fn accumulator_operation(&mut self, selector: u8, value: u8) {
        match selector {
            0 => self.add_a(value),
            1 => self.add_with_carry_a(value),
            2 => self.subtract_a(value),
            3 => self.subtract_with_carry_a(value),
            4 => self.and_a(value),
            5 => self.xor_a(value),
            6 => self.or_a(value),
            _ => self.compare_a(value),
        }
    }

    fn shift_operation(&mut self, selector: u8, value: u8) -> u8 {
        match selector {
            0 => self.rotate_left_circular(value),
            1 => self.rotate_right_circular(value),
            2 => self.rotate_left_through_carry(value),
            3 => self.rotate_right_through_carry(value),
            4 => self.shift_left_arithmetic(value),
            5 => self.shift_right_arithmetic(value),
            6 => self.swap_nibbles(value),
            _ => self.shift_right_logical(value),
        }
    }

    fn increment(&mut self, value: u8) -> u8 {
        let incremented = value.wrapping_add(1);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, incremented == 0);
        flags.remove(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_add(value, 1));
        incremented
    }

    fn decrement(&mut self, value: u8) -> u8 {
        let decremented = value.wrapping_sub(1);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, decremented == 0);
        flags.insert(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_sub(value, 1));
        decremented
    }

    fn add_hl<B: Bus>(&mut self, bus: &mut B, value: u16) {
        bus.internal_cycle();
        let hl = self.registers.hl();
        let (result, carry) = hl.overflowing_add(value);
        let flags = &mut self.registers.f;
        flags.remove(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, (hl & 0x0fff) + (value & 0x0fff) > 0x0fff);
        flags.set(Flags::CARRY, carry);
        self.registers.set_hl(result);
    }

    fn add_a(&mut self, value: u8) {
        let a = self.registers.a;
        let (result, carry) = a.overflowing_add(value);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, result == 0);
        flags.remove(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_add(a, value));
        flags.set(Flags::CARRY, carry);
        self.registers.a = result;
    }

    fn add_with_carry_a(&mut self, value: u8) {
        let a = u16::from(self.registers.a);
        let carry_in = u16::from(self.registers.f.contains(Flags::CARRY));
        let result = a + u16::from(value) + carry_in;
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, result as u8 == 0);
        flags.remove(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, (a & 0x0f) + u16::from(value & 0x0f) + carry_in > 0x0f);
        flags.set(Flags::CARRY, result > 0xff);
        self.registers.a = result as u8;
    }

    fn subtract_a(&mut self, value: u8) {
        let a = self.registers.a;
        let (result, carry) = a.overflowing_sub(value);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, result == 0);
        flags.insert(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_sub(a, value));
        flags.set(Flags::CARRY, carry);
        self.registers.a = result;
    }

    fn subtract_with_carry_a(&mut self, value: u8) {
        let a = u16::from(self.registers.a);
        let carry_in = u16::from(self.registers.f.contains(Flags::CARRY));
        let result = a.wrapping_sub(u16::from(value)).wrapping_sub(carry_in);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, result as u8 == 0);
        flags.insert(Flags::SUBTRACT);
        flags.set(
            Flags::HALF_CARRY,
            (a & 0x0f) < u16::from(value & 0x0f) + carry_in,
        );
        flags.set(Flags::CARRY, a < u16::from(value) + carry_in);
        self.registers.a = result as u8;
    }

    fn and_a(&mut self, value: u8) {
        self.registers.a &= value;
        let zero = self.registers.a == 0;
        let flags = &mut self.registers.f;
        *flags = Flags::HALF_CARRY;
        flags.set(Flags::ZERO, zero);
    }

    fn xor_a(&mut self, value: u8) {
        self.registers.a ^= value;
        let zero = self.registers.a == 0;
        self.registers.f = Flags::empty();
        self.registers.f.set(Flags::ZERO, zero);
    }

    fn or_a(&mut self, value: u8) {
        self.registers.a |= value;
        let zero = self.registers.a == 0;
        self.registers.f = Flags::empty();
        self.registers.f.set(Flags::ZERO, zero);
    }

    fn compare_a(&mut self, value: u8) {
        let a = self.registers.a;
        let (result, carry) = a.overflowing_sub(value);
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, result == 0);
        flags.insert(Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_sub(a, value));
        flags.set(Flags::CARRY, carry);
    }

    fn decimal_adjust_a(&mut self) {
        let flags = self.registers.f;
        let mut adjustment = 0u8;
        let mut carry = flags.contains(Flags::CARRY);
        if flags.contains(Flags::SUBTRACT) {
            if flags.contains(Flags::HALF_CARRY) {
                adjustment += 0x06;
            }
            if carry {
                adjustment += 0x60;
            }
            self.registers.a = self.registers.a.wrapping_sub(adjustment);
        } else {
            if flags.contains(Flags::HALF_CARRY) || self.registers.a & 0x0f > 0x09 {
                adjustment += 0x06;
            }
            if carry || self.registers.a > 0x99 {
                adjustment += 0x60;
                carry = true;
            }
            self.registers.a = self.registers.a.wrapping_add(adjustment);
        }
        let zero = self.registers.a == 0;
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, zero);
        flags.remove(Flags::HALF_CARRY);
        flags.set(Flags::CARRY, carry);
    }

    fn jump_relative_conditional<B: Bus>(&mut self, bus: &mut B, condition: bool) {
        let offset = self.fetch_immediate8(bus).cast_signed();
        if condition {
            bus.internal_cycle();
            self.registers.pc = self.registers.pc.wrapping_add_signed(i16::from(offset));
        }
    }

    fn jump_conditional<B: Bus>(&mut self, bus: &mut B, condition: bool) {
        let address = self.fetch_immediate16(bus);
        if condition {
            bus.internal_cycle();
            self.registers.pc = address;
        }
    }

    fn call_conditional<B: Bus>(&mut self, bus: &mut B, condition: bool) {
        let address = self.fetch_immediate16(bus);
        if condition {
            self.push_word(bus, self.registers.pc);
            self.registers.pc = address;
        }
    }

    fn return_conditional<B: Bus>(&mut self, bus: &mut B, condition: bool) {
        bus.internal_cycle();
        if condition {
            let address = self.pop_word(bus);
            bus.internal_cycle();
            self.registers.pc = address;
        }
    }

    fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let [high, low] = value.to_be_bytes();
        bus.internal_cycle();
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        bus.write_cycle(self.registers.sp, high);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        bus.write_cycle(self.registers.sp, low);
    }

    fn pop_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let low = bus.read_cycle(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        let high = bus.read_cycle(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(1);
        u16::from_be_bytes([high, low])
    }

    fn adjusted_stack_pointer(&mut self, offset: u8) -> u16 {
        let [_, sp_low] = self.registers.sp.to_be_bytes();
        let (_, carry) = sp_low.overflowing_add(offset);
        let flags = &mut self.registers.f;
        flags.remove(Flags::ZERO | Flags::SUBTRACT);
        flags.set(Flags::HALF_CARRY, half_carry_add(sp_low, offset));
        flags.set(Flags::CARRY, carry);
        self.registers
            .sp
            .wrapping_add_signed(i16::from(offset.cast_signed()))
    }

    // Prefixed operations

    fn rotate_left_circular(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 0x80 != 0);
        result
    }

    fn rotate_right_circular(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(1);
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 1 != 0);
        result
    }

    fn rotate_left_through_carry(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.registers.f.contains(Flags::CARRY) as u8;
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 0x80 != 0);
        result
    }

    fn rotate_right_through_carry(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | ((self.registers.f.contains(Flags::CARRY) as u8) << 7);
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 1 != 0);
        result
    }

    fn shift_left_arithmetic(&mut self, value: u8) -> u8 {
        let result = value << 1;
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 0x80 != 0);
        result
    }

    fn shift_right_arithmetic(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 1 != 0);
        result
    }

    fn swap_nibbles(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        result
    }

    fn shift_right_logical(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        let flags = &mut self.registers.f;
        *flags = Flags::empty();
        flags.set(Flags::ZERO, result == 0);
        flags.set(Flags::CARRY, value & 1 != 0);
        result
    }

    fn test_bit(&mut self, bit_position: u8, value: u8) {
        let flags = &mut self.registers.f;
        flags.set(Flags::ZERO, value & (1 << bit_position) == 0);
        flags.remove(Flags::SUBTRACT);
        flags.insert(Flags::HALF_CARRY);
    }
}

#[cfg(test)]
mod tests {
    use crate::cpu::testing::RecordingBus;
    use crate::cpu::{BusActivity, Cpu, Flags};

    fn run_one(opcode_bytes: &[u8], setup: impl FnOnce(&mut Cpu, &mut RecordingBus)) -> (Cpu, RecordingBus) {
        let mut cpu = Cpu::default();
        let mut bus = RecordingBus::new();
        setup(&mut cpu, &mut bus);
        for (offset, byte) in opcode_bytes.iter().enumerate() {
            bus.memory[0x0200 + offset] = *byte;
        }
        cpu.registers.pc = 0x0200;
        cpu.fetch_next_instruction(&mut bus);
        bus.trace.clear();
        cpu.step_single_instruction(&mut bus).unwrap();
        (cpu, bus)
    }

    #[test]
    fn subtract_with_carry_borrows_through() {
        let (cpu, _) = run_one(&[0x9f], |cpu, _| {
            // SBC A, A with carry set: result 0xff, N/H/C all set.
            cpu.registers.a = 0x10;
            cpu.registers.f = Flags::CARRY;
        });
        assert_eq!(0xff, cpu.registers.a);
        assert_eq!(
            Flags::SUBTRACT | Flags::HALF_CARRY | Flags::CARRY,
            cpu.registers.f
        );
    }

    #[test]
    fn add_with_carry_chains_half_carry() {
        let (cpu, _) = run_one(&[0x88], |cpu, _| {
            cpu.registers.a = 0x0f;
            cpu.registers.b = 0x00;
            cpu.registers.f = Flags::CARRY;
        });
        assert_eq!(0x10, cpu.registers.a);
        assert_eq!(Flags::HALF_CARRY, cpu.registers.f);
    }

    #[test]
    fn compare_sets_flags_without_touching_a() {
        let (cpu, _) = run_one(&[0xfe, 0x90], |cpu, _| {
            cpu.registers.a = 0x40;
        });
        assert_eq!(0x40, cpu.registers.a);
        assert!(cpu.registers.f.contains(Flags::CARRY));
        assert!(cpu.registers.f.contains(Flags::SUBTRACT));
    }

    #[test]
    fn ld_a16_sp_writes_both_bytes_little_endian() {
        let (_, bus) = run_one(&[0x08, 0x00, 0xc1], |cpu, _| {
            cpu.registers.sp = 0xbeef;
        });
        assert_eq!(0xef, bus.memory[0xc100]);
        assert_eq!(0xbe, bus.memory[0xc101]);
        // two immediates + two writes + trailing fetch
        assert_eq!(5, bus.trace.len());
    }

    #[test]
    fn inc_hl_memory_is_a_read_modify_write() {
        let (cpu, bus) = run_one(&[0x34], |cpu, bus| {
            cpu.registers.set_hl(0xc040);
            bus.memory[0xc040] = 0x0f;
        });
        assert_eq!(0x10, bus.memory[0xc040]);
        assert!(cpu.registers.f.contains(Flags::HALF_CARRY));
        assert_eq!(
            vec![
                BusActivity::Read { address: 0xc040 },
                BusActivity::Write { address: 0xc040, value: 0x10 },
                BusActivity::Read { address: 0x0201 },
            ],
            bus.trace
        );
    }

    #[test]
    fn inc_preserves_carry() {
        let (cpu, _) = run_one(&[0x3c], |cpu, _| {
            cpu.registers.a = 0xff;
            cpu.registers.f = Flags::CARRY;
        });
        assert_eq!(0x00, cpu.registers.a);
        assert_eq!(Flags::ZERO | Flags::HALF_CARRY | Flags::CARRY, cpu.registers.f);
    }

    #[test]
    fn rlca_clears_zero_even_when_result_is_zero() {
        let (cpu, _) = run_one(&[0x07], |cpu, _| {
            cpu.registers.a = 0x00;
            cpu.registers.f = Flags::ZERO;
        });
        assert_eq!(Flags::empty(), cpu.registers.f);
    }

    #[test]
    fn prefixed_rlc_sets_zero() {
        let (cpu, _) = run_one(&[0xcb, 0x00], |cpu, _| {
            cpu.registers.b = 0x00;
        });
        assert!(cpu.registers.f.contains(Flags::ZERO));
    }

    #[test]
    fn swap_exchanges_nibbles() {
        let (cpu, _) = run_one(&[0xcb, 0x37], |cpu, _| {
            cpu.registers.a = 0xf1;
            cpu.registers.f = Flags::CARRY | Flags::SUBTRACT | Flags::HALF_CARRY;
        });
        assert_eq!(0x1f, cpu.registers.a);
        assert_eq!(Flags::empty(), cpu.registers.f);
    }

    #[test]
    fn sra_keeps_the_sign_bit() {
        let (cpu, _) = run_one(&[0xcb, 0x2f], |cpu, _| {
            cpu.registers.a = 0x81;
        });
        assert_eq!(0xc0, cpu.registers.a);
        assert!(cpu.registers.f.contains(Flags::CARRY));
    }

    #[test]
    fn jp_hl_costs_no_extra_cycle() {
        let (cpu, bus) = run_one(&[0xe9], |cpu, bus| {
            cpu.registers.set_hl(0xc200);
            bus.memory[0xc200] = 0x00;
        });
        assert_eq!(0xc201, cpu.registers.pc);
        assert_eq!(1, bus.trace.len());
    }

    #[test]
    fn ret_cc_not_taken_is_two_cycles() {
        let (_, bus) = run_one(&[0xc0], |cpu, _| {
            cpu.registers.f = Flags::ZERO;
        });
        assert_eq!(2, bus.trace.len());
    }

    #[test]
    fn ld_hl_sp_offset_is_three_cycles_and_flags_from_low_byte() {
        let (cpu, bus) = run_one(&[0xf8, 0xff], |cpu, _| {
            // SP + (-1)
            cpu.registers.sp = 0xd000;
        });
        assert_eq!(0xcfff, cpu.registers.hl());
        assert_eq!(0xd000, cpu.registers.sp);
        assert_eq!(Flags::empty(), cpu.registers.f);
        assert_eq!(3, bus.trace.len());
    }

    #[test]
    fn ldh_addresses_the_io_page() {
        let (_, bus) = run_one(&[0xe0, 0x80], |cpu, _| {
            cpu.registers.a = 0x5a;
        });
        assert_eq!(
            BusActivity::Write { address: 0xff80, value: 0x5a },
            bus.trace[1]
        );
    }
}
