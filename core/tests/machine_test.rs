//! End-to-end tests driving a full [`Gba`] through its public [`Machine`]
//! and [`Bus`] surface, the way a frontend does. These complement the
//! scenario-level unit tests colocated with the CPU decoder, DMA engine,
//! and timers (`cpu::arm`, `cpu::thumb`, `dma`, `timer`) by exercising the
//! wiring between subsystems rather than a single module in isolation.

use gba_core::bus::{Bus, BusMaster, FIRMWARE_SIZE};
use gba_core::io;
use gba_core::machine::{Gba, InputButton, Machine};

fn sample_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x1000];
    rom[0xA0..0xA3].copy_from_slice(b"E2E");
    let sum: u8 = rom[0xA0..0xBD].iter().fold(0u8, |acc, &b| acc.wrapping_sub(b));
    rom[0xBD] = sum.wrapping_sub(0x19);
    rom
}

fn boot() -> Gba {
    let firmware = vec![0u8; FIRMWARE_SIZE];
    Gba::new(&firmware, &sample_rom()).expect("well-formed cartridge")
}

#[test]
fn fresh_machine_reports_gba_display_size() {
    let gba = boot();
    assert_eq!(gba.display_size(), (240, 160));
}

#[test]
fn running_frames_eventually_marks_a_frame_drawn_without_panicking() {
    let mut gba = boot();
    // Firmware is all zeros, which decodes to a long run of ARM AND
    // instructions; this only checks that the frame loop terminates and
    // the framebuffer comes out the right size, not picture content.
    for _ in 0..3 {
        gba.run_frame();
    }
    assert_eq!(gba.render_frame().len(), 240 * 160);
}

#[test]
fn pressing_and_releasing_a_button_round_trips_through_keyinput() {
    let mut gba = boot();
    for button in InputButton::ALL {
        gba.set_input(button, true);
    }
    let keyinput = gba.read16(BusMaster::Cpu, 0x0400_0130);
    assert_eq!(keyinput, 0, "every button held should clear every KEYINPUT bit");

    for button in InputButton::ALL {
        gba.set_input(button, false);
    }
    let keyinput = gba.read16(BusMaster::Cpu, 0x0400_0130);
    assert_eq!(keyinput, 0x03FF, "releasing everything restores the idle (active-low) pattern");
}

#[test]
fn keypad_irq_fires_when_enabled_condition_is_met() {
    let mut gba = boot();
    gba.write16(BusMaster::Cpu, 0x0400_0208, 1); // IME
    gba.write16(BusMaster::Cpu, 0x0400_0200, io::INT_KEYPAD); // IE
    // KEYCNT: enable (bit14), OR condition (bit15 clear), watch button A (bit0).
    gba.write16(BusMaster::Cpu, 0x0400_0132, (1 << 14) | 0b1);

    gba.set_input(InputButton::A, true);

    let iflags = gba.read16(BusMaster::Cpu, 0x0400_0202);
    assert_ne!(iflags & io::INT_KEYPAD, 0);
}

#[test]
fn immediate_dma_copies_synchronously_and_self_disables() {
    let mut gba = boot();
    gba.write32(BusMaster::Cpu, 0x0200_0000, 0x1122_3344);
    gba.write32(BusMaster::Cpu, 0x0400_00D4, 0x0200_0000); // DMA3 source
    gba.write32(BusMaster::Cpu, 0x0400_00D8, 0x0300_0000); // DMA3 dest (IWRAM)
    gba.write16(BusMaster::Cpu, 0x0400_00DC, 1); // count
    gba.write16(BusMaster::Cpu, 0x0400_00DE, 0x8400); // enable, 32-bit, immediate

    assert_eq!(gba.read32(BusMaster::Cpu, 0x0300_0000), 0x1122_3344);
    // Non-repeating immediate transfers clear their own enable bit.
    assert_eq!(gba.read16(BusMaster::Cpu, 0x0400_00DE) & 0x8000, 0);
}

fn sram_rom() -> Vec<u8> {
    let mut rom = sample_rom();
    rom.extend_from_slice(b"SRAM_V110");
    rom
}

#[test]
fn backup_memory_survives_a_save_and_load_round_trip() {
    let firmware = vec![0u8; FIRMWARE_SIZE];
    let rom = sram_rom();
    let mut gba = Gba::new(&firmware, &rom).unwrap();
    gba.write8(BusMaster::Cpu, 0x0E00_0000, 0xAB);
    let saved = gba.save_backup();

    let mut fresh = Gba::new(&firmware, &rom).unwrap();
    fresh.load_backup(&saved);
    assert_eq!(fresh.read8(BusMaster::Cpu, 0x0E00_0000), 0xAB);
}

#[test]
fn reset_clears_cpu_and_video_but_preserves_loaded_cartridge() {
    let mut gba = boot();
    gba.write16(BusMaster::Cpu, 0x0400_0000, 0x0403); // DISPCNT
    gba.reset();
    assert_eq!(gba.read16(BusMaster::Cpu, 0x0400_0000), 0, "reset reinitializes I/O registers");
    // The cartridge ROM itself isn't reloaded by reset, so the header is
    // still readable afterwards.
    assert_eq!(gba.read8(BusMaster::Cpu, 0x0800_00A0), b'E');
}

#[test]
fn fill_audio_never_leaves_the_output_buffer_uninitialized() {
    let mut gba = boot();
    let mut out = [0xAAu16 as i16; 8];
    gba.fill_audio(&mut out);
    assert!(out.iter().all(|&s| s == 0), "idle FIFOs should yield silence, not garbage");
}
