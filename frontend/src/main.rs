use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gba_core::machine::{Gba, Machine};

mod audio;
mod emulator;
mod input;
mod rom_path;
mod video;

/// A cycle-driven handheld console emulator.
#[derive(Parser)]
struct Args {
    /// Path to the cartridge ROM image.
    rom: PathBuf,

    /// Path to the boot firmware image (defaults to firmware.bin beside the ROM).
    #[arg(long)]
    firmware: Option<PathBuf>,

    /// Window scale factor.
    #[arg(long, default_value_t = 3)]
    scale: u32,

    /// Skip the cartridge header checksum warning.
    #[arg(long)]
    skip_bios_checks: bool,

    /// Override the save file path (defaults to the ROM path with a .sav extension).
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let firmware_path = args.firmware.unwrap_or_else(|| rom_path::default_firmware_path(&args.rom));
    let firmware = std::fs::read(&firmware_path)
        .with_context(|| format!("failed to read firmware image {}", firmware_path.display()))?;
    let rom =
        std::fs::read(&args.rom).with_context(|| format!("failed to read ROM image {}", args.rom.display()))?;

    if !args.skip_bios_checks && rom.len() < 0xC0 {
        log::warn!("ROM is smaller than the cartridge header, expect garbage output");
    }

    let mut gba = Gba::new(&firmware, &rom).context("failed to initialize emulator core")?;

    let save_path = args.save.unwrap_or_else(|| rom_path::save_path_for(&args.rom));
    match std::fs::read(&save_path) {
        Ok(data) => {
            log::info!("loaded save data from {}", save_path.display());
            gba.load_backup(&data);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to read save file {}: {e}", save_path.display()),
    }

    let key_map = input::default_key_map();
    gba.reset();
    emulator::run(&mut gba, &key_map, args.scale);

    let data = gba.save_backup();
    if !data.is_empty()
        && let Err(e) = std::fs::write(&save_path, data)
    {
        log::warn!("failed to write save file {}: {e}", save_path.display());
    }

    Ok(())
}
