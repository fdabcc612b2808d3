// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash device capability consumed by the media access layer.
//!
//! A [`FlashDevice`] is one physical medium. Offsets passed to it are
//! relative to the base of the [`MediaRegion`](crate::layout::MediaRegion)
//! it is registered for; the MAL performs the translation.

use core::time::Duration;

use crc::{Crc, CRC_32_ISO_HDLC};
use thiserror::Error;

/// CRC-32 used for module integrity (ISO HDLC, as zlib).
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Chunk size used when streaming flash contents (CRC, verify).
pub const READ_CHUNK_SIZE: usize = 256;

/// Kind of physical medium behind an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MediumKind {
    InternalFlash,
    SerialFlash,
}

impl MediumKind {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            MediumKind::InternalFlash => 0,
            MediumKind::SerialFlash => 1,
        }
    }

    /// Typical duration of one operation on this medium.
    pub fn timing(self) -> MediumTiming {
        match self {
            MediumKind::InternalFlash => MediumTiming {
                erase_ms: 50,
                program_ms: 50,
            },
            MediumKind::SerialFlash => MediumTiming {
                erase_ms: 100,
                program_ms: 10,
            },
        }
    }
}

/// Per-medium typical operation times advertised to DFU hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MediumTiming {
    /// Sector erase.
    pub erase_ms: u32,
    /// Program of one transfer block.
    pub program_ms: u32,
}

impl MediumTiming {
    /// Used for addresses that do not resolve to a medium.
    pub const FALLBACK: MediumTiming = MediumTiming {
        erase_ms: 100,
        program_ms: 50,
    };

    pub fn duration(&self, is_erase: bool) -> Duration {
        let ms = if is_erase {
            self.erase_ms
        } else {
            self.program_ms
        };
        Duration::from_millis(ms as u64)
    }
}

/// Driver-level failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    #[error("erase failed")]
    Erase,
    #[error("program failed")]
    Program,
    #[error("read failed")]
    Read,
    #[error("offset outside the device")]
    OutOfBounds,
}

/// Erase/program/read primitives of one physical medium.
pub trait FlashDevice {
    fn kind(&self) -> MediumKind;

    /// Number of addressable bytes.
    fn capacity(&self) -> u32;

    /// Bring the device up. Called once from the MAL's `init()`.
    fn init(&mut self) -> Result<(), FlashError> {
        Ok(())
    }

    /// Erase every sector touched by `[offset, offset + length)`.
    fn erase(&mut self, offset: u32, length: u32) -> Result<(), FlashError>;

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError>;

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Direct view of the device contents for memory-mapped media.
    fn mapped(&self, _offset: u32, _length: usize) -> Option<&[u8]> {
        None
    }

    /// Compare flash contents at `offset` against `expected`.
    fn verify(&mut self, offset: u32, expected: &[u8]) -> Result<bool, FlashError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut at = offset;
        for part in expected.chunks(READ_CHUNK_SIZE) {
            let buf = &mut chunk[..part.len()];
            self.read(at, buf)?;
            if buf != part {
                return Ok(false);
            }
            at += part.len() as u32;
        }
        Ok(true)
    }
}

/// Offset of the sector containing `offset` and the number of bytes to erase
/// so that `[offset, offset + length)` is fully covered.
pub fn sector_span(offset: u32, length: u32, sector_size: u32) -> (u32, u32) {
    let start = offset - offset % sector_size;
    let end = (offset + length.max(1)).div_ceil(sector_size) * sector_size;
    (start, end - start)
}
