//! The top-level machine: wires CPU, bus, DMA, timers, video, and cartridge
//! backup together behind a single [`Bus`] implementation (spec §3 "Machine
//! aggregate", §4.8 "Frame loop"). I/O register writes return [`io::IoEvent`]
//! values which are acted on immediately, in the same call that produced
//! them, matching the teacher's pattern of a top-level struct being the one
//! place allowed to borrow all of its subsystems mutably at once.

use std::fmt;

use crate::backup::Backup;
use crate::bus::{self, Bus, BusMaster, MemoryRegions, Region, FIRMWARE_SIZE};
use crate::cart::Cartridge;
use crate::cpu::Cpu;
use crate::dma;
use crate::error::EmuError;
use crate::io::{self, IoEvent, IoRegs};
use crate::timer;
use crate::video::{self, Video, VideoEvent};

/// Approximate CPU clock, used only to size a frame's worth of stepping;
/// spec scope excludes cycle-exact timing (see cpu::Cpu::step).
const CYCLES_PER_FRAME: u32 = 280_896;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputButton {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

impl InputButton {
    fn bit(self) -> u16 {
        match self {
            InputButton::A => 1 << 0,
            InputButton::B => 1 << 1,
            InputButton::Select => 1 << 2,
            InputButton::Start => 1 << 3,
            InputButton::Right => 1 << 4,
            InputButton::Left => 1 << 5,
            InputButton::Up => 1 << 6,
            InputButton::Down => 1 << 7,
            InputButton::R => 1 << 8,
            InputButton::L => 1 << 9,
        }
    }

    pub const ALL: [InputButton; 10] = [
        InputButton::A,
        InputButton::B,
        InputButton::Select,
        InputButton::Start,
        InputButton::Right,
        InputButton::Left,
        InputButton::Up,
        InputButton::Down,
        InputButton::R,
        InputButton::L,
    ];
}

impl fmt::Display for InputButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The operations a frontend drives: stepping a frame, reading the rendered
/// picture, feeding input, and persisting cartridge backup memory.
pub trait Machine {
    fn display_size(&self) -> (usize, usize);
    fn run_frame(&mut self);
    fn render_frame(&self) -> &[u32];
    fn set_input(&mut self, button: InputButton, pressed: bool);
    fn input_map() -> &'static [InputButton] {
        &InputButton::ALL
    }
    fn reset(&mut self);
    fn save_backup(&self) -> Vec<u8>;
    fn load_backup(&mut self, data: &[u8]);
    /// Drains up to `len` interleaved stereo samples queued by Direct Sound
    /// into `out`, zero-filling whatever the FIFOs didn't have ready.
    fn fill_audio(&mut self, out: &mut [i16]);
}

pub struct Gba {
    cpu: Cpu,
    mem: MemoryRegions,
    io: IoRegs,
    backup: Backup,
    video: Video,
    keys_pressed: u16,
}

impl Gba {
    pub fn new(firmware: &[u8], rom: &[u8]) -> Result<Self, EmuError> {
        let Cartridge { mem, backup } = Cartridge::load(firmware, rom)?;
        Ok(Self { cpu: Cpu::new(), mem, io: IoRegs::new(), backup, video: Video::new(), keys_pressed: 0 })
    }

    fn step_cpu(&mut self) -> u32 {
        let pc = self.cpu.pc();
        self.mem.set_pc_in_firmware(pc < FIRMWARE_SIZE as u32);
        let mut cpu = std::mem::take(&mut self.cpu);
        let cycles = cpu.step(self);
        self.cpu = cpu;
        cycles
    }

    fn run_dma(&mut self, timing: io::DmaTiming) {
        let irq_bits = dma::run(&mut self.mem, &mut self.io, &mut self.backup, timing);
        if irq_bits != 0 {
            self.io.raise_irq(irq_bits);
        }
    }

    fn handle_io_events(&mut self, events: Vec<IoEvent>) {
        for event in events {
            match event {
                IoEvent::DmaEnabled(ch) => {
                    if self.io.dma[ch].timing() == io::DmaTiming::Immediate {
                        self.run_dma(io::DmaTiming::Immediate);
                    }
                }
                IoEvent::TimerEnabled(_) => {}
                IoEvent::Halted => self.cpu.halted = true,
                IoEvent::KeypadRecheck => self.io.recheck_keypad_irq(),
                IoEvent::FifoAPush(_) | IoEvent::FifoBPush(_) => {}
            }
        }
    }

    fn step_video_and_timers(&mut self, cycles: u32) {
        let timer_result = timer::step(&mut self.io, cycles);
        if timer_result.irq_bits != 0 {
            self.io.raise_irq(timer_result.irq_bits);
        }
        if timer_result.fifo_a_refill {
            self.run_dma(io::DmaTiming::Special);
        }
        if timer_result.fifo_b_refill {
            self.run_dma(io::DmaTiming::Special);
        }

        let video_events = self.video.step(cycles, &mut self.io, &self.mem);
        for event in video_events {
            match event {
                VideoEvent::HBlankDma => self.run_dma(io::DmaTiming::HBlank),
                VideoEvent::VBlankDma => self.run_dma(io::DmaTiming::VBlank),
            }
        }
    }

    fn gpio_region(&self, addr: u32) -> Option<u32> {
        if !self.backup.has_rtc() {
            return None;
        }
        let offset = addr & 0x01FF_FFFF;
        match offset {
            crate::backup::GPIO_DATA | crate::backup::GPIO_DIRECTION | crate::backup::GPIO_CONTROL => Some(offset),
            _ => None,
        }
    }

    /// EEPROM is wired into the top of the cartridge ROM aperture rather
    /// than the separate backup-memory aperture (spec §4.6;
    /// `original_source/src/memory.cpp:159-167` checks the same
    /// `0x0d000000..0x0e000000` band before falling through to a plain ROM
    /// read).
    fn is_eeprom_region(&self, addr: u32) -> bool {
        self.backup.kind() == crate::backup::BackupKind::Eeprom && (0x0D00_0000..0x0E00_0000).contains(&addr)
    }
}

impl Default for Gba {
    fn default() -> Self {
        Self {
            cpu: Cpu::new(),
            mem: MemoryRegions::new(),
            io: IoRegs::new(),
            backup: Backup::none(),
            video: Video::new(),
            keys_pressed: 0,
        }
    }
}

impl Bus for Gba {
    fn read8(&mut self, master: BusMaster, addr: u32) -> u8 {
        match bus::decode(addr) {
            Region::Io => {
                let hw = self.io.read_halfword((addr & 0x3FF) & !1);
                (hw >> (8 * (addr & 1))) as u8
            }
            Region::Backup => self.backup.read8(addr),
            Region::Rom => {
                if self.is_eeprom_region(addr) {
                    return self.backup.read8(addr);
                }
                if let Some(offset) = self.gpio_region(addr) {
                    if let Some(value) = self.backup.gpio_read(offset) {
                        return value as u8;
                    }
                }
                self.mem.read(Region::Rom, addr, 1) as u8
            }
            region => {
                let _ = master;
                self.mem.read(region, addr, 1) as u8
            }
        }
    }

    fn read16(&mut self, master: BusMaster, addr: u32) -> u16 {
        match bus::decode(addr) {
            Region::Io => self.io.read_halfword(addr & 0x3FF),
            Region::Backup => self.backup.read16(addr),
            Region::Rom => {
                if self.is_eeprom_region(addr) {
                    return self.backup.read16(addr);
                }
                if let Some(offset) = self.gpio_region(addr) {
                    if let Some(value) = self.backup.gpio_read(offset) {
                        return value;
                    }
                }
                self.mem.read(Region::Rom, addr, 2) as u16
            }
            region => {
                let _ = master;
                self.mem.read(region, addr, 2) as u16
            }
        }
    }

    fn read32(&mut self, master: BusMaster, addr: u32) -> u32 {
        match bus::decode(addr) {
            Region::Io => self.io.read_word(addr & 0x3FF),
            Region::Backup => self.backup.read32(addr),
            Region::Rom if self.is_eeprom_region(addr) => self.backup.read32(addr),
            region => {
                let _ = master;
                self.mem.read(region, addr, 4)
            }
        }
    }

    fn write8(&mut self, master: BusMaster, addr: u32, value: u8) {
        let _ = master;
        match bus::decode(addr) {
            Region::Io => {
                let events = self.io.write_byte(addr & 0x3FF, value);
                self.handle_io_events(events);
            }
            Region::Backup => self.backup.write8(addr, value),
            Region::Rom if self.is_eeprom_region(addr) => self.backup.write8(addr, value),
            region => self.mem.write8(region, addr, value),
        }
    }

    fn write16(&mut self, master: BusMaster, addr: u32, value: u16) {
        let _ = master;
        match bus::decode(addr) {
            Region::Io => {
                let events = self.io.write_halfword(addr & 0x3FF, value);
                self.handle_io_events(events);
            }
            Region::Backup => self.backup.write16(addr, value),
            Region::Rom => {
                if self.is_eeprom_region(addr) {
                    self.backup.write16(addr, value);
                    return;
                }
                if let Some(offset) = self.gpio_region(addr) {
                    self.backup.gpio_write(offset, value);
                }
                // ROM itself is not writable; GPIO writes fall through harmlessly.
            }
            region => self.mem.write16(region, addr, value),
        }
    }

    fn write32(&mut self, master: BusMaster, addr: u32, value: u32) {
        let _ = master;
        match bus::decode(addr) {
            Region::Io => {
                let events = self.io.write_word(addr & 0x3FF, value);
                self.handle_io_events(events);
            }
            Region::Backup => self.backup.write32(addr, value),
            Region::Rom if self.is_eeprom_region(addr) => self.backup.write32(addr, value),
            region => self.mem.write32(region, addr, value),
        }
    }
}

impl Machine for Gba {
    fn display_size(&self) -> (usize, usize) {
        (video::SCREEN_WIDTH, video::SCREEN_HEIGHT)
    }

    fn run_frame(&mut self) {
        let mut total_cycles = 0u32;
        while total_cycles < CYCLES_PER_FRAME {
            let cycles = self.step_cpu();
            self.step_video_and_timers(cycles);
            total_cycles += cycles;
            if self.video.take_frame_drawn() {
                break;
            }
        }
    }

    fn render_frame(&self) -> &[u32] {
        self.video.framebuffer()
    }

    fn set_input(&mut self, button: InputButton, pressed: bool) {
        if pressed {
            self.keys_pressed |= button.bit();
        } else {
            self.keys_pressed &= !button.bit();
        }
        // KEYINPUT is active-low: a set bit means the button is released.
        self.io.set_keyinput(!self.keys_pressed);
        self.io.recheck_keypad_irq();
    }

    fn reset(&mut self) {
        self.cpu = Cpu::new();
        self.io = IoRegs::new();
        self.video = Video::new();
        self.io.set_keyinput(!self.keys_pressed);
    }

    fn save_backup(&self) -> Vec<u8> {
        self.backup.raw().to_vec()
    }

    fn load_backup(&mut self, data: &[u8]) {
        self.backup.load_raw(data);
    }

    fn fill_audio(&mut self, out: &mut [i16]) {
        for sample in out.iter_mut() {
            *sample = 0;
        }
        let left = self.io.fifo_a.pop_front().unwrap_or(0) as i16 * 64;
        let right = self.io.fifo_b.pop_front().unwrap_or(0) as i16 * 64;
        for pair in out.chunks_mut(2) {
            if pair.len() == 2 {
                pair[0] = left;
                pair[1] = right;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x200];
        rom[0xA0..0xA3].copy_from_slice(b"ABC");
        let sum: u8 = rom[0xA0..0xBD].iter().fold(0u8, |acc, &b| acc.wrapping_sub(b));
        rom[0xBD] = sum.wrapping_sub(0x19);
        rom
    }

    #[test]
    fn new_rejects_malformed_cartridge() {
        let firmware = vec![0u8; FIRMWARE_SIZE];
        assert!(Gba::new(&firmware, &[]).is_err());
    }

    #[test]
    fn io_write_through_bus_reaches_register_file() {
        let firmware = vec![0u8; FIRMWARE_SIZE];
        let mut gba = Gba::new(&firmware, &sample_rom()).unwrap();
        gba.write16(BusMaster::Cpu, 0x0400_0000, 0x0403);
        assert_eq!(gba.read16(BusMaster::Cpu, 0x0400_0000), 0x0403);
    }

    #[test]
    fn set_input_clears_keyinput_bit_for_pressed_button() {
        let firmware = vec![0u8; FIRMWARE_SIZE];
        let mut gba = Gba::new(&firmware, &sample_rom()).unwrap();
        gba.set_input(InputButton::A, true);
        assert_eq!(gba.read16(BusMaster::Cpu, 0x0400_0130) & 1, 0);
        gba.set_input(InputButton::A, false);
        assert_eq!(gba.read16(BusMaster::Cpu, 0x0400_0130) & 1, 1);
    }

    #[test]
    fn immediate_dma_fires_synchronously_on_enable_write() {
        let firmware = vec![0u8; FIRMWARE_SIZE];
        let mut gba = Gba::new(&firmware, &sample_rom()).unwrap();
        gba.write32(BusMaster::Cpu, 0x0200_0000, 0xCAFE_BABE);
        gba.write32(BusMaster::Cpu, 0x0400_00D4, 0x0200_0000); // DMA3 source
        gba.write32(BusMaster::Cpu, 0x0400_00D8, 0x0200_1000); // DMA3 dest
        gba.write16(BusMaster::Cpu, 0x0400_00DC, 1); // count
        gba.write16(BusMaster::Cpu, 0x0400_00DE, 0x8400 | (1 << 10)); // enable, 32-bit, immediate
        assert_eq!(gba.read32(BusMaster::Cpu, 0x0200_1000), 0xCAFE_BABE);
    }
}
