//! Error types that cross the core/frontend boundary.
//!
//! Per spec, only startup/file-loading failures propagate as `Result`.
//! Everything the CPU or bus encounters during emulation (unimplemented
//! opcodes, bad memory accesses, malformed backup protocol sequences) is
//! handled locally and never surfaces here — see `cpu::exceptions` and
//! `backup` for how those are folded back into observable emulator state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("firmware image must be exactly {expected} bytes, got {actual}")]
    FirmwareSize { expected: usize, actual: usize },

    #[error("ROM image is empty")]
    EmptyRom,

    #[error("ROM image of {actual} bytes exceeds the maximum of {max} bytes")]
    RomTooLarge { actual: usize, max: usize },
}
