//! Cartridge ROM and firmware loading: size validation, header checksum,
//! and backup-kind detection (spec §3 "Cartridge ROM", §4.6 supplement).

use crate::backup::Backup;
use crate::bus::{MemoryRegions, FIRMWARE_SIZE, MAX_ROM_SIZE};
use crate::error::EmuError;

/// The header checksum real hardware verifies before booting a cartridge:
/// a one-byte complement of the sum of bytes `0xA0..0xBD`, stored at
/// `0xBD`. Unlike the teacher's CRC32-based ROM validation this isn't a
/// hard gate — homebrew and patched ROMs routinely carry a stale value —
/// so a mismatch is logged, not rejected.
pub fn header_checksum_valid(rom: &[u8]) -> bool {
    if rom.len() <= 0xBD {
        return false;
    }
    let sum: u8 = rom[0xA0..0xBD].iter().fold(0u8, |acc, &b| acc.wrapping_sub(b));
    let expected = sum.wrapping_sub(0x19);
    rom[0xBD] == expected
}

pub fn game_title(rom: &[u8]) -> String {
    if rom.len() < 0xAC {
        return String::new();
    }
    let bytes = &rom[0xA0..0xAC];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

pub struct Cartridge {
    pub mem: MemoryRegions,
    pub backup: Backup,
}

impl Cartridge {
    pub fn load(firmware: &[u8], rom: &[u8]) -> Result<Self, EmuError> {
        if firmware.len() != FIRMWARE_SIZE {
            return Err(EmuError::FirmwareSize { expected: FIRMWARE_SIZE, actual: firmware.len() });
        }
        if rom.is_empty() {
            return Err(EmuError::EmptyRom);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(EmuError::RomTooLarge { actual: rom.len(), max: MAX_ROM_SIZE });
        }

        if !header_checksum_valid(rom) {
            log::warn!("cartridge header checksum mismatch, loading anyway");
        }
        log::info!("loaded cartridge \"{}\" ({} bytes)", game_title(rom), rom.len());

        let mut mem = MemoryRegions::new();
        mem.load_firmware(firmware);
        mem.load_rom(rom);

        let backup = Backup::detect(rom);
        log::info!("detected backup type: {:?}", backup.kind());

        Ok(Self { mem, backup })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rom(title: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x200];
        rom[0xA0..0xA0 + title.len()].copy_from_slice(title);
        let sum: u8 = rom[0xA0..0xBD].iter().fold(0u8, |acc, &b| acc.wrapping_sub(b));
        rom[0xBD] = sum.wrapping_sub(0x19);
        rom
    }

    #[test]
    fn header_checksum_accepts_well_formed_header() {
        let rom = sample_rom(b"TESTGAME");
        assert!(header_checksum_valid(&rom));
    }

    #[test]
    fn header_checksum_rejects_corrupted_header() {
        let mut rom = sample_rom(b"TESTGAME");
        rom[0xA5] ^= 0xFF;
        assert!(!header_checksum_valid(&rom));
    }

    #[test]
    fn game_title_trims_nul_padding() {
        let rom = sample_rom(b"FOO");
        assert_eq!(game_title(&rom), "FOO");
    }

    #[test]
    fn load_rejects_wrong_size_firmware() {
        let rom = sample_rom(b"X");
        let err = Cartridge::load(&[0u8; 10], &rom).unwrap_err();
        assert!(matches!(err, EmuError::FirmwareSize { .. }));
    }

    #[test]
    fn load_rejects_empty_rom() {
        let firmware = vec![0u8; FIRMWARE_SIZE];
        let err = Cartridge::load(&firmware, &[]).unwrap_err();
        assert!(matches!(err, EmuError::EmptyRom));
    }
}
