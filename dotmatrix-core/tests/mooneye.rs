//! Mooneye acceptance suite.
//!
//! Point DOTMATRIX_MOONEYE_DIR at the `acceptance` directory of a
//! mooneye-test-suite release (mts-20240926 or later).

mod common;

const INSTRUCTION_BUDGET: u64 = 10_000_000;

fn run_mooneye(relative_path: &str) {
    let Some(directory) = common::suite_directory("DOTMATRIX_MOONEYE_DIR") else {
        return;
    };
    let rom = std::fs::read(directory.join(relative_path))
        .unwrap_or_else(|error| panic!("could not read {relative_path}: {error}"));
    let mut emulator = common::emulator_with_rom(&rom);
    assert!(
        common::run_to_mooneye_breakpoint(&mut emulator, INSTRUCTION_BUDGET),
        "{relative_path} never reached its breakpoint"
    );
    common::assert_fibonacci_sentinel(&emulator, relative_path);
}

#[test]
fn add_sp_e_timing() {
    run_mooneye("add_sp_e_timing.gb")
}

#[test]
fn mem_oam() {
    run_mooneye("bits/mem_oam.gb")
}

#[test]
fn reg_f() {
    run_mooneye("bits/reg_f.gb")
}

#[test]
fn unused_hwio_gs() {
    run_mooneye("bits/unused_hwio-GS.gb")
}

#[test]
fn boot_div_dmg_abc_mgb() {
    run_mooneye("boot_div-dmgABCmgb.gb")
}

#[test]
fn boot_regs_dmg_abc() {
    run_mooneye("boot_regs-dmgABC.gb")
}

#[test]
fn call_cc_timing() {
    run_mooneye("call_cc_timing.gb")
}

#[test]
fn call_cc_timing2() {
    run_mooneye("call_cc_timing2.gb")
}

#[test]
fn call_timing() {
    run_mooneye("call_timing.gb")
}

#[test]
fn call_timing2() {
    run_mooneye("call_timing2.gb")
}

#[test]
fn di_timing_gs() {
    run_mooneye("di_timing-GS.gb")
}

#[test]
fn div_timing() {
    run_mooneye("div_timing.gb")
}

#[test]
fn ei_sequence() {
    run_mooneye("ei_sequence.gb")
}

#[test]
fn ei_timing() {
    run_mooneye("ei_timing.gb")
}

#[test]
fn halt_ime0_ei() {
    run_mooneye("halt_ime0_ei.gb")
}

#[test]
fn halt_ime0_nointr_timing() {
    run_mooneye("halt_ime0_nointr_timing.gb")
}

#[test]
fn halt_ime1_timing() {
    run_mooneye("halt_ime1_timing.gb")
}

#[test]
fn if_ie_registers() {
    run_mooneye("if_ie_registers.gb")
}

#[test]
fn daa() {
    run_mooneye("instr/daa.gb")
}

#[test]
fn ie_push() {
    run_mooneye("interrupts/ie_push.gb")
}

#[test]
fn intr_timing() {
    run_mooneye("intr_timing.gb")
}

#[test]
fn jp_cc_timing() {
    run_mooneye("jp_cc_timing.gb")
}

#[test]
fn jp_timing() {
    run_mooneye("jp_timing.gb")
}

#[test]
fn ld_hl_sp_e_timing() {
    run_mooneye("ld_hl_sp_e_timing.gb")
}

#[test]
fn oam_dma_basic() {
    run_mooneye("oam_dma/basic.gb")
}

#[test]
fn oam_dma_reg_read() {
    run_mooneye("oam_dma/reg_read.gb")
}

#[test]
fn oam_dma_restart() {
    run_mooneye("oam_dma_restart.gb")
}

#[test]
fn oam_dma_start() {
    run_mooneye("oam_dma_start.gb")
}

#[test]
fn oam_dma_timing() {
    run_mooneye("oam_dma_timing.gb")
}

#[test]
fn pop_timing() {
    run_mooneye("pop_timing.gb")
}

#[test]
fn push_timing() {
    run_mooneye("push_timing.gb")
}

#[test]
fn rapid_di_ei() {
    run_mooneye("rapid_di_ei.gb")
}

#[test]
fn ret_cc_timing() {
    run_mooneye("ret_cc_timing.gb")
}

#[test]
fn ret_timing() {
    run_mooneye("ret_timing.gb")
}

#[test]
fn reti_intr_timing() {
    run_mooneye("reti_intr_timing.gb")
}

#[test]
fn reti_timing() {
    run_mooneye("reti_timing.gb")
}

#[test]
fn rst_timing() {
    run_mooneye("rst_timing.gb")
}

#[test]
fn timer_div_write() {
    run_mooneye("timer/div_write.gb")
}

#[test]
fn timer_rapid_toggle() {
    run_mooneye("timer/rapid_toggle.gb")
}

#[test]
fn timer_tim00() {
    run_mooneye("timer/tim00.gb")
}

#[test]
fn timer_tim00_div_trigger() {
    run_mooneye("timer/tim00_div_trigger.gb")
}

#[test]
fn timer_tim01() {
    run_mooneye("timer/tim01.gb")
}

#[test]
fn timer_tim01_div_trigger() {
    run_mooneye("timer/tim01_div_trigger.gb")
}

#[test]
fn timer_tim10() {
    run_mooneye("timer/tim10.gb")
}

#[test]
fn timer_tim10_div_trigger() {
    run_mooneye("timer/tim10_div_trigger.gb")
}

#[test]
fn timer_tim11() {
    run_mooneye("timer/tim11.gb")
}

#[test]
fn timer_tim11_div_trigger() {
    run_mooneye("timer/tim11_div_trigger.gb")
}

#[test]
fn timer_tima_reload() {
    run_mooneye("timer/tima_reload.gb")
}

#[test]
fn timer_tima_write_reloading() {
    run_mooneye("timer/tima_write_reloading.gb")
}

#[test]
fn timer_tma_write_reloading() {
    run_mooneye("timer/tma_write_reloading.gb")
}

#[test]
fn ppu_intr_2_0_timing() {
    run_mooneye("ppu/intr_2_0_timing.gb")
}

#[test]
fn ppu_intr_2_mode0_timing() {
    run_mooneye("ppu/intr_2_mode0_timing.gb")
}

#[test]
fn ppu_intr_2_mode3_timing() {
    run_mooneye("ppu/intr_2_mode3_timing.gb")
}

#[test]
fn ppu_intr_2_oam_ok_timing() {
    run_mooneye("ppu/intr_2_oam_ok_timing.gb")
}

#[test]
fn ppu_stat_irq_blocking() {
    run_mooneye("ppu/stat_irq_blocking.gb")
}

#[test]
fn ppu_stat_lyc_onoff() {
    run_mooneye("ppu/stat_lyc_onoff.gb")
}

#[test]
fn ppu_vblank_stat_intr_gs() {
    run_mooneye("ppu/vblank_stat_intr-GS.gb")
}
