//! Cartridge backup memory (spec §3 "Cartridge backup", §4.6): EEPROM,
//! Flash, SRAM, and the GPIO-attached RTC, selected by scanning the ROM
//! image for the save-type ID strings real cartridges embed, the same
//! detection a cartridge's own bus decode performs implicitly by virtue
//! of only one backup chip being wired up at a time.

pub mod eeprom;
pub mod flash;
pub mod rtc;
pub mod sram;

use eeprom::Eeprom;
use flash::{Flash, FlashSize};
use rtc::{Gpio, Rtc, RTC_CS, RTC_SCK};
use sram::Sram;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupKind {
    None,
    Sram,
    Flash(FlashSize),
    Eeprom,
}

enum Store {
    None,
    Sram(Sram),
    Flash(Flash),
    Eeprom(Eeprom),
}

/// GPIO register offsets within the upper ROM aperture (spec §3).
pub const GPIO_DATA: u32 = 0xC4;
pub const GPIO_DIRECTION: u32 = 0xC6;
pub const GPIO_CONTROL: u32 = 0xC8;

pub struct Backup {
    store: Store,
    has_rtc: bool,
    gpio: Gpio,
    rtc: Rtc,
    dma_active: bool,
}

impl Backup {
    pub fn none() -> Self {
        Self { store: Store::None, has_rtc: false, gpio: Gpio::default(), rtc: Rtc::new(), dma_active: false }
    }

    /// Detects the backup type by scanning `rom` for the ID strings GBA
    /// cartridges embed (`EEPROM_V`, `SRAM_V`, `FLASH_V`/`FLASH512_V`,
    /// `FLASH1M_V`) and whether `RTC_V` (the RTC-over-GPIO marker) appears.
    pub fn detect(rom: &[u8]) -> Self {
        let has_rtc = contains(rom, b"RTC_V");
        let store = if contains(rom, b"EEPROM_V") {
            Store::Eeprom(Eeprom::new())
        } else if contains(rom, b"FLASH1M_V") {
            Store::Flash(Flash::new(FlashSize::Kb128))
        } else if contains(rom, b"FLASH_V") || contains(rom, b"FLASH512_V") {
            Store::Flash(Flash::new(FlashSize::Kb64))
        } else if contains(rom, b"SRAM_V") {
            Store::Sram(Sram::new())
        } else {
            Store::None
        };
        Self { store, has_rtc, gpio: Gpio::default(), rtc: Rtc::new(), dma_active: false }
    }

    /// Tells the backup store whether a DMA channel currently has the bus,
    /// so an SRAM read issued mid-transfer can return 0 per spec §4.6.
    pub fn set_dma_active(&mut self, active: bool) {
        self.dma_active = active;
    }

    pub fn kind(&self) -> BackupKind {
        match &self.store {
            Store::None => BackupKind::None,
            Store::Sram(_) => BackupKind::Sram,
            Store::Flash(f) => BackupKind::Flash(f.size()),
            Store::Eeprom(_) => BackupKind::Eeprom,
        }
    }

    pub fn has_rtc(&self) -> bool {
        self.has_rtc
    }

    pub fn raw(&self) -> &[u8] {
        match &self.store {
            Store::None => &[],
            Store::Sram(s) => s.raw(),
            Store::Flash(f) => f.raw(),
            Store::Eeprom(e) => e.raw(),
        }
    }

    pub fn load_raw(&mut self, data: &[u8]) {
        match &mut self.store {
            Store::None => {}
            Store::Sram(s) => s.load_raw(data),
            Store::Flash(f) => f.load_raw(data),
            Store::Eeprom(e) => e.load_raw(data),
        }
    }

    /// Informs an EEPROM-backed cartridge of a completed DMA word count so
    /// it can infer its address width (spec §4.4).
    pub fn notice_dma_count(&mut self, count: u32) {
        if let Store::Eeprom(e) = &mut self.store {
            e.notice_dma_count(count);
        }
    }

    pub fn read8(&mut self, addr: u32) -> u8 {
        match &mut self.store {
            Store::None => 0xFF,
            Store::Sram(s) => s.read_byte(addr, self.dma_active),
            Store::Flash(f) => f.read_byte(addr),
            Store::Eeprom(e) => {
                let bit = e.read_bit();
                (bit | (bit << 1) | (bit << 2) | (bit << 3) | (bit << 4) | (bit << 5) | (bit << 6) | (bit << 7))
                    as u8
            }
        }
    }

    pub fn write8(&mut self, addr: u32, value: u8) {
        match &mut self.store {
            Store::None => {}
            Store::Sram(s) => s.write_byte(addr, value),
            Store::Flash(f) => f.write_byte(addr, value),
            Store::Eeprom(e) => e.write_bit((value & 1) as u16),
        }
    }

    pub fn read16(&mut self, addr: u32) -> u16 {
        let v = self.read8(addr) as u16;
        v | (v << 8)
    }

    pub fn write16(&mut self, addr: u32, value: u16) {
        self.write8(addr, (value >> (8 * (addr & 1))) as u8);
    }

    pub fn read32(&mut self, addr: u32) -> u32 {
        let v = self.read8(addr) as u32;
        v | (v << 8) | (v << 16) | (v << 24)
    }

    pub fn write32(&mut self, addr: u32, value: u32) {
        self.write8(addr, (value >> (8 * (addr & 3))) as u8);
    }

    // -- GPIO / RTC, mapped into the top of the ROM aperture -------------

    pub fn gpio_read(&mut self, offset: u32) -> Option<u16> {
        if self.gpio.read_enable == 0 {
            return None;
        }
        match offset {
            GPIO_DATA => Some(self.gpio.data),
            GPIO_DIRECTION => Some(self.gpio.direction),
            GPIO_CONTROL => Some(self.gpio.read_enable),
            _ => None,
        }
    }

    pub fn gpio_write(&mut self, offset: u32, value: u16) {
        match offset {
            GPIO_DATA => {
                let prev = self.gpio.data;
                self.gpio.data = value & 0xF;
                if self.has_rtc
                    && self.gpio.data & RTC_CS != 0
                    && self.gpio.data & RTC_SCK != 0
                    && prev & RTC_SCK == 0
                {
                    self.rtc.clock_edge(&mut self.gpio, prev);
                }
            }
            GPIO_DIRECTION => self.gpio.direction = value & 0xF,
            GPIO_CONTROL => self.gpio.read_enable = value & 1,
            _ => {}
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_eeprom_marker() {
        let mut rom = vec![0u8; 64];
        rom.extend_from_slice(b"EEPROM_V120");
        let backup = Backup::detect(&rom);
        assert_eq!(backup.kind(), BackupKind::Eeprom);
    }

    #[test]
    fn detects_flash1m_marker_as_128k() {
        let mut rom = vec![0u8; 64];
        rom.extend_from_slice(b"FLASH1M_V102");
        let backup = Backup::detect(&rom);
        assert_eq!(backup.kind(), BackupKind::Flash(FlashSize::Kb128));
    }

    #[test]
    fn detects_sram_marker() {
        let mut rom = vec![0u8; 64];
        rom.extend_from_slice(b"SRAM_V110");
        let backup = Backup::detect(&rom);
        assert_eq!(backup.kind(), BackupKind::Sram);
    }

    #[test]
    fn no_marker_yields_none() {
        let rom = vec![0u8; 256];
        let backup = Backup::detect(&rom);
        assert_eq!(backup.kind(), BackupKind::None);
    }

    #[test]
    fn rtc_marker_enables_gpio_clocking() {
        let mut rom = vec![0u8; 64];
        rom.extend_from_slice(b"RTC_V100");
        let backup = Backup::detect(&rom);
        assert!(backup.has_rtc());
    }
}
