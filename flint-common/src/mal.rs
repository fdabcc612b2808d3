// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Media access layer.
//!
//! [`MediaAccessDispatcher`] routes absolute addresses to the [`FlashDevice`]
//! that owns them, refuses protected ranges and only reports a write as done
//! once it has been read back and compared.
//!
//! Write sequence for one block:
//!   1. program; on failure program once more, then give up (`WriteFailed`)
//!   2. verify by read-back; on mismatch repeat from 1
//!   3. after `WRITE_VERIFY_CYCLES` mismatches give up (`VerifyFailed`)

use core::time::Duration;

use thiserror::Error;

use crate::flash::{FlashDevice, FlashError, MediumKind, MediumTiming, CRC32, READ_CHUNK_SIZE};
use crate::fmt::{debug, warn};
use crate::layout::{MediaRegion, Platform, ProtectedRange};

/// Capacity of the transfer buffer (one DFU/OTA block).
pub const TRANSFER_BUFFER_SIZE: usize = 4096;

/// Program attempts per write-verify cycle.
pub const PROGRAM_ATTEMPTS: u32 = 2;

/// Program-then-verify cycles before a write is declared failed.
pub const WRITE_VERIFY_CYCLES: u32 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MalError {
    #[error("address 0x{0:08x} does not belong to any medium")]
    UnknownMedium(u32),
    #[error("address 0x{0:08x} is in a protected range")]
    Protected(u32),
    #[error("no driver registered for {0:?}")]
    DeviceUnavailable(MediumKind),
    #[error("range 0x{address:08x}+{length} crosses the end of its medium")]
    OutOfRange { address: u32, length: u32 },
    #[error("length {0} exceeds the transfer buffer")]
    LengthExceeded(usize),
    #[error("erase at 0x{0:08x} failed")]
    EraseFailed(u32),
    #[error("write at 0x{0:08x} failed")]
    WriteFailed(u32),
    #[error("verify at 0x{0:08x} failed")]
    VerifyFailed(u32),
    #[error("read at 0x{0:08x} failed")]
    ReadFailed(u32),
}

/// Staging buffer between received bytes and flash.
pub struct TransferBuffer {
    data: [u8; TRANSFER_BUFFER_SIZE],
}

impl TransferBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; TRANSFER_BUFFER_SIZE],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved address: the region it falls in and its offset inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub region: &'static MediaRegion,
    pub offset: u32,
}

/// Single erase/write/read surface over every registered medium.
pub struct MediaAccessDispatcher<'a> {
    regions: &'static [MediaRegion],
    protected: &'static [ProtectedRange],
    devices: [Option<&'a mut dyn FlashDevice>; MediumKind::COUNT],
    buffer: TransferBuffer,
}

impl<'a> MediaAccessDispatcher<'a> {
    pub fn new(platform: &Platform) -> Self {
        Self {
            regions: platform.regions,
            protected: platform.protected,
            devices: [None, None],
            buffer: TransferBuffer::new(),
        }
    }

    /// Register the driver for its medium, replacing any previous one.
    pub fn attach(&mut self, device: &'a mut dyn FlashDevice) {
        let kind = device.kind();
        debug!("MAL: attach {:?}", kind);
        self.devices[kind.index()] = Some(device);
    }

    /// Initialise every registered device and clear the transfer buffer.
    pub fn init(&mut self) -> Result<(), MalError> {
        self.buffer.clear();
        for device in self.devices.iter_mut().flatten() {
            let kind = device.kind();
            device.init().map_err(|e| {
                warn!("MAL: {:?} init failed: {:?}", kind, e);
                MalError::DeviceUnavailable(kind)
            })?;
        }
        Ok(())
    }

    /// Classify an address.
    pub fn resolve(&self, address: u32) -> Result<Resolved, MalError> {
        self.regions
            .iter()
            .find(|r| r.contains(address))
            .map(|region| Resolved {
                region,
                offset: region.offset_of(address),
            })
            .ok_or(MalError::UnknownMedium(address))
    }

    pub fn is_protected(&self, address: u32, length: u32) -> bool {
        self.protected.iter().any(|p| p.overlaps(address, length))
    }

    /// Buffer the caller fills before calling [`write`](Self::write).
    pub fn transfer_buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }

    /// Copy `data` into the transfer buffer.
    pub fn load(&mut self, data: &[u8]) -> Result<(), MalError> {
        if data.len() > TRANSFER_BUFFER_SIZE {
            return Err(MalError::LengthExceeded(data.len()));
        }
        self.buffer.as_mut_slice()[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Erase the sector containing `address`.
    pub fn erase(&mut self, address: u32) -> Result<(), MalError> {
        self.erase_range(address, 1)
    }

    /// Erase every sector touched by `[address, address + length)`.
    pub fn erase_range(&mut self, address: u32, length: u32) -> Result<(), MalError> {
        let resolved = self.check_writable(address, length)?;
        let device = device_for(&mut self.devices, resolved.region.kind)?;
        device.erase(resolved.offset, length).map_err(|e| {
            warn!("MAL: erase at 0x{:08x} failed: {:?}", address, e);
            MalError::EraseFailed(address)
        })
    }

    /// Commit the first `length` bytes of the transfer buffer at `address`.
    pub fn write(&mut self, address: u32, length: usize) -> Result<(), MalError> {
        if length > TRANSFER_BUFFER_SIZE {
            return Err(MalError::LengthExceeded(length));
        }
        let resolved = self.check_writable(address, length as u32)?;
        let device = device_for(&mut self.devices, resolved.region.kind)?;
        program_verified(device, address, resolved.offset, &self.buffer.data[..length])
    }

    /// [`load`](Self::load) followed by [`write`](Self::write).
    pub fn program(&mut self, address: u32, data: &[u8]) -> Result<(), MalError> {
        self.load(data)?;
        self.write(address, data.len())
    }

    /// Read `length` bytes at `address`.
    ///
    /// Memory-mapped media return a direct view; others are copied into the
    /// transfer buffer, so the result must be dropped before the next call.
    /// Unknown addresses read as zeros.
    pub fn read(&mut self, address: u32, length: usize) -> Result<&[u8], MalError> {
        if length > TRANSFER_BUFFER_SIZE {
            return Err(MalError::LengthExceeded(length));
        }
        let resolved = match self.resolve(address) {
            Ok(resolved) => resolved,
            Err(_) => {
                warn!("MAL: read from unknown medium at 0x{:08x}", address);
                self.buffer.data[..length].fill(0);
                return Ok(&self.buffer.data[..length]);
            }
        };
        check_span(resolved, address, length as u32)?;

        let Some(device) = self.devices[resolved.region.kind.index()].as_deref_mut() else {
            warn!("MAL: no driver for 0x{:08x}, reading zeros", address);
            self.buffer.data[..length].fill(0);
            return Ok(&self.buffer.data[..length]);
        };

        if device.mapped(resolved.offset, 0).is_some() {
            return device
                .mapped(resolved.offset, length)
                .ok_or(MalError::ReadFailed(address));
        }

        let buf = &mut self.buffer.data[..length];
        device
            .read(resolved.offset, buf)
            .map_err(|_| MalError::ReadFailed(address))?;
        Ok(&self.buffer.data[..length])
    }

    /// Read into a caller-owned buffer. Unknown addresses are an error here.
    pub fn read_into(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MalError> {
        let resolved = self.resolve(address)?;
        check_span(resolved, address, buf.len() as u32)?;
        let device = device_for(&mut self.devices, resolved.region.kind)?;
        device
            .read(resolved.offset, buf)
            .map_err(|_| MalError::ReadFailed(address))
    }

    /// CRC-32 of `[address, address + length)`.
    pub fn crc32(&mut self, address: u32, length: u32) -> Result<u32, MalError> {
        let mut digest = CRC32.digest();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut remaining = length as usize;
        let mut at = address;

        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.read_into(at, &mut chunk[..n])?;
            digest.update(&chunk[..n]);
            at += n as u32;
            remaining -= n;
        }

        Ok(digest.finalize())
    }

    /// How long a DFU host should wait before polling after an operation.
    pub fn polling_time(&self, address: u32, is_erase: bool) -> Duration {
        let timing = match self.resolve(address) {
            Ok(resolved) => resolved.region.kind.timing(),
            Err(_) => MediumTiming::FALLBACK,
        };
        timing.duration(is_erase)
    }

    fn check_writable(&self, address: u32, length: u32) -> Result<Resolved, MalError> {
        let resolved = self.resolve(address)?;
        if self.is_protected(address, length) {
            warn!("MAL: rejected access to protected address 0x{:08x}", address);
            return Err(MalError::Protected(address));
        }
        check_span(resolved, address, length)?;
        Ok(resolved)
    }
}

fn device_for<'d, 'a>(
    devices: &'d mut [Option<&'a mut dyn FlashDevice>; MediumKind::COUNT],
    kind: MediumKind,
) -> Result<&'d mut (dyn FlashDevice + 'a), MalError> {
    devices[kind.index()]
        .as_deref_mut()
        .ok_or(MalError::DeviceUnavailable(kind))
}

fn check_span(resolved: Resolved, address: u32, length: u32) -> Result<(), MalError> {
    let end = resolved.offset as u64 + length as u64;
    if end > resolved.region.size() as u64 {
        return Err(MalError::OutOfRange { address, length });
    }
    Ok(())
}

fn program_verified(
    device: &mut dyn FlashDevice,
    address: u32,
    offset: u32,
    data: &[u8],
) -> Result<(), MalError> {
    for cycle in 1..=WRITE_VERIFY_CYCLES {
        program_with_retry(device, address, offset, data)?;
        match device.verify(offset, data) {
            Ok(true) => return Ok(()),
            Ok(false) => warn!(
                "MAL: verify mismatch at 0x{:08x} (cycle {} of {})",
                address,
                cycle,
                WRITE_VERIFY_CYCLES
            ),
            Err(e) => warn!("MAL: verify read at 0x{:08x} failed: {:?}", address, e),
        }
    }
    Err(MalError::VerifyFailed(address))
}

fn program_with_retry(
    device: &mut dyn FlashDevice,
    address: u32,
    offset: u32,
    data: &[u8],
) -> Result<(), MalError> {
    let mut last: Option<FlashError> = None;
    for attempt in 1..=PROGRAM_ATTEMPTS {
        match device.program(offset, data) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "MAL: program at 0x{:08x} failed (attempt {}): {:?}",
                    address,
                    attempt,
                    e
                );
                last = Some(e);
            }
        }
    }
    debug!("MAL: giving up on 0x{:08x} after {:?}", address, last);
    Err(MalError::WriteFailed(address))
}
