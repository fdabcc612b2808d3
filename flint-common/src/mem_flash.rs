// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RAM-backed flash device.
//!
//! Behaves like NOR flash as far as the engine can observe: erase sets whole
//! sectors to 0xFF, program can only clear bits. Faults can be injected per
//! operation and every call is counted so retry bounds can be checked.

use crate::flash::{sector_span, FlashDevice, FlashError, MediumKind};

pub struct MemFlash<'a> {
    kind: MediumKind,
    storage: &'a mut [u8],
    sector_size: u32,
    fail_programs: u32,
    corrupt_programs: u32,
    fail_erases: u32,
    program_calls: u32,
    erase_calls: u32,
    read_calls: u32,
}

impl<'a> MemFlash<'a> {
    pub fn new(kind: MediumKind, storage: &'a mut [u8], sector_size: u32) -> Self {
        Self {
            kind,
            storage,
            sector_size,
            fail_programs: 0,
            corrupt_programs: 0,
            fail_erases: 0,
            program_calls: 0,
            erase_calls: 0,
            read_calls: 0,
        }
    }

    /// Make the next `count` program calls report failure without writing.
    pub fn fail_next_programs(&mut self, count: u32) {
        self.fail_programs = count;
    }

    /// Make the next `count` program calls succeed but leave the first byte
    /// unprogrammed.
    pub fn corrupt_next_programs(&mut self, count: u32) {
        self.corrupt_programs = count;
    }

    pub fn fail_next_erases(&mut self, count: u32) {
        self.fail_erases = count;
    }

    pub fn program_calls(&self) -> u32 {
        self.program_calls
    }

    pub fn erase_calls(&self) -> u32 {
        self.erase_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.read_calls
    }

    pub fn contents(&self) -> &[u8] {
        &self.storage[..]
    }

    fn range(&self, offset: u32, length: usize) -> Result<core::ops::Range<usize>, FlashError> {
        let start = offset as usize;
        let end = start.checked_add(length).ok_or(FlashError::OutOfBounds)?;
        if end > self.storage.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl FlashDevice for MemFlash<'_> {
    fn kind(&self) -> MediumKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.storage.len() as u32
    }

    fn erase(&mut self, offset: u32, length: u32) -> Result<(), FlashError> {
        self.erase_calls += 1;
        if self.fail_erases > 0 {
            self.fail_erases -= 1;
            return Err(FlashError::Erase);
        }
        let (start, length) = sector_span(offset, length, self.sector_size);
        let range = self.range(start, length as usize)?;
        self.storage[range].fill(0xFF);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        self.program_calls += 1;
        let range = self.range(offset, data.len())?;
        if self.fail_programs > 0 {
            self.fail_programs -= 1;
            return Err(FlashError::Program);
        }
        let skip = if self.corrupt_programs > 0 {
            self.corrupt_programs -= 1;
            1
        } else {
            0
        };
        for (cell, byte) in self.storage[range].iter_mut().zip(data).skip(skip) {
            *cell &= byte;
        }
        Ok(())
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.read_calls += 1;
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.storage[range]);
        Ok(())
    }

    fn mapped(&self, offset: u32, length: usize) -> Option<&[u8]> {
        if self.kind != MediumKind::InternalFlash {
            return None;
        }
        let range = self.range(offset, length).ok()?;
        Some(&self.storage[range])
    }
}
